//! Execution ledger: the append-only record of every invocation attempt.
//!
//! Quota counts are derived from these rows, so there is no in-process
//! counter to keep coherent between service instances.

pub mod invocation;

pub use invocation::Invoker;

use crate::error::CoreResult;
use crate::state::SharedDb;
use crate::types::Execution;
use chrono::{SubsecRound, Utc};
use tracing::info;

/// Everything known about an attempt once the provider call has settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub agent_id: String,
    pub user_id: String,
    pub input: serde_json::Value,
    pub output: Option<String>,
    pub tokens: u64,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Ledger handle for recording executions.
#[derive(Clone)]
pub struct ExecutionLedger {
    db: SharedDb,
}

impl ExecutionLedger {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Append one immutable row for `attempt`, stamped with the current time.
    pub async fn record(&self, attempt: Attempt) -> CoreResult<Execution> {
        let execution = Execution {
            id: ulid::Ulid::new().to_string(),
            agent_id: attempt.agent_id,
            user_id: attempt.user_id,
            input: attempt.input,
            output: attempt.output,
            tokens: attempt.tokens,
            duration_ms: attempt.duration_ms,
            success: attempt.success,
            error: attempt.error,
            // Storage keeps millisecond precision
            created_at: Utc::now().trunc_subsecs(3),
        };

        info!(
            "Ledger: agent {} by {} success={} tokens={} {}ms",
            execution.agent_id,
            execution.user_id,
            execution.success,
            execution.tokens,
            execution.duration_ms
        );
        self.persist(execution).await
    }

    /// Persist via spawn_blocking so sqlite I/O does not block the async runtime.
    async fn persist(&self, execution: Execution) -> CoreResult<Execution> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let db = db.blocking_lock();
            db.insert_execution(&execution)?;
            Ok(execution)
        })
        .await?
    }
}
