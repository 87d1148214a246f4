//! Invoke the provider for an admitted request and record the outcome.
//!
//! Provider failures (including timeouts) become ledger data: the row is
//! written with `success = false` and the error text, and the caller gets the
//! same information back in the outcome. Only storage faults propagate.

use crate::error::CoreResult;
use crate::inference::{Completion, InferenceGateway, Prompt, ProviderError};
use crate::ledger::{Attempt, ExecutionLedger};
use crate::types::{Agent, ExecutionOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Runs admitted invocations against the gateway and records them.
#[derive(Clone)]
pub struct Invoker {
    ledger: ExecutionLedger,
    gateway: Arc<dyn InferenceGateway>,
    timeout: Duration,
}

impl Invoker {
    pub fn new(ledger: ExecutionLedger, gateway: Arc<dyn InferenceGateway>, timeout: Duration) -> Self {
        Self {
            ledger,
            gateway,
            timeout,
        }
    }

    /// Call the provider for `agent` on behalf of `user_id` and append one ledger row.
    pub async fn invoke_and_record(
        &self,
        agent: &Agent,
        user_id: &str,
        input: serde_json::Value,
    ) -> CoreResult<ExecutionOutcome> {
        let prompt = Prompt {
            system: agent.system_prompt.clone(),
            user: serde_json::to_string(&input)?,
        };

        let started = Instant::now();
        let result = self.call_provider(&prompt, agent).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let attempt = match result {
            Ok(completion) => Attempt {
                agent_id: agent.id.clone(),
                user_id: user_id.to_string(),
                input,
                output: completion.text,
                tokens: completion.tokens_used,
                duration_ms,
                success: true,
                error: None,
            },
            Err(e) => {
                warn!("Inference for agent {} failed: {}", agent.id, e);
                Attempt {
                    agent_id: agent.id.clone(),
                    user_id: user_id.to_string(),
                    input,
                    output: None,
                    tokens: 0,
                    duration_ms,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        let execution = self.ledger.record(attempt).await?;
        Ok(ExecutionOutcome::from(&execution))
    }

    async fn call_provider(&self, prompt: &Prompt, agent: &Agent) -> Result<Completion, ProviderError> {
        let tier = agent.complexity;
        match tokio::time::timeout(
            self.timeout,
            self.gateway.invoke(prompt, tier, tier.max_tokens()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }
}
