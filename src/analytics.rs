//! Read-only rollups over one agent's slice of the execution ledger.

use crate::error::{CoreError, CoreResult};
use crate::state::{Database, SharedDb};
use crate::types::AnalyticsSummary;

/// Rows returned in `recent_executions`.
pub const RECENT_LIMIT: u64 = 7;

/// Compute the summary for `agent_id`, visible only to its owner.
pub fn summary_in(db: &Database, agent_id: &str, owner_id: &str) -> CoreResult<AnalyticsSummary> {
    db.find_agent_owned(agent_id, owner_id)?
        .ok_or_else(|| CoreError::not_found("agent"))?;

    let stats = db.execution_stats(agent_id)?;
    let success_rate = if stats.total == 0 {
        0.0
    } else {
        stats.successful as f64 / stats.total as f64 * 100.0
    };

    Ok(AnalyticsSummary {
        total_executions: stats.total,
        successful_executions: stats.successful,
        success_rate,
        avg_duration: stats.avg_duration_ms.unwrap_or(0.0),
        total_tokens: stats.total_tokens,
        recent_executions: db.recent_executions(agent_id, RECENT_LIMIT)?,
    })
}

#[derive(Clone)]
pub struct Analytics {
    db: SharedDb,
}

impl Analytics {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    pub async fn summary(&self, agent_id: &str, owner_id: &str) -> CoreResult<AnalyticsSummary> {
        let db = self.db.lock().await;
        summary_in(&db, agent_id, owner_id)
    }
}
