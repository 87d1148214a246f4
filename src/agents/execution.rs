//! Agent invocation, directly by the owner or through a license key.
//!
//! Every rejection here happens before the provider is called. Admission
//! spends quota with conditional writes (a daily slot, a license unit), and
//! the outcome of every admitted request is then written to the ledger.
//!
//! Spending and recording are separate writes around the provider call. If
//! the ledger write fails, or the process dies mid-call, the spent slot or
//! unit stays spent with no execution row behind it.

use crate::agents::service::find_live;
use crate::agents::AgentService;
use crate::error::{CoreError, CoreResult, LicenseRejection, QuotaViolation};
use crate::license::authority::{increment_usage_in, validate_in};
use crate::license::InvalidReason;
use crate::quota::enforcer::reserve_execute_in;
use crate::types::{ExecutionOutcome, License};
use chrono::Utc;
use tracing::{debug, error, warn};

impl AgentService {
    /// Run an owned, non-archived agent for its owner.
    ///
    /// One of the owner's daily slots is reserved before the provider call.
    pub async fn execute(
        &self,
        agent_id: &str,
        owner_id: &str,
        input: serde_json::Value,
    ) -> CoreResult<ExecutionOutcome> {
        let agent = {
            let db = self.db.lock().await;
            let agent = find_live(&db, agent_id, owner_id)?;
            reserve_execute_in(&db, owner_id, Utc::now())?;
            agent
        };

        self.invoker
            .invoke_and_record(&agent, owner_id, input)
            .await
            .inspect_err(|e| {
                error!(
                    "Execution of agent {} reserved a daily slot but was not recorded: {}",
                    agent.id, e
                );
            })
    }

    /// Run the agent a license key grants access to, billed to the license owner.
    ///
    /// The daily slot and the license unit are claimed together in one
    /// transaction before the provider call, so a request that loses the race
    /// for the last execution never reaches the provider. The ledger row is a
    /// later write: if it fails, the unit is consumed without an execution
    /// row and the failure is logged at error level.
    pub async fn execute_with_license(
        &self,
        key: &str,
        input: serde_json::Value,
    ) -> CoreResult<ExecutionOutcome> {
        let (agent, license) = {
            let db = self.db.lock().await;
            let now = Utc::now();

            // Outside the claim transaction so lazy expiry sticks even when we refuse
            let validation = validate_in(&db, key, now)?;
            let license = match (validation.valid, validation.license, validation.reason) {
                (true, Some(license), _) => license,
                (_, _, reason) => {
                    let err = rejection(reason, db.find_license_by_key(&normalize(key))?);
                    warn!("License execution refused: {}", err);
                    return Err(err);
                }
            };

            let agent = db.atomically(|db| {
                let agent = find_live(db, &license.agent_id, &license.user_id)?;
                reserve_execute_in(db, &license.user_id, now)?;
                increment_usage_in(db, &license.key, now)?;
                Ok(agent)
            })?;
            debug!("Claimed execution on license {}", license.id);
            (agent, license)
        };

        self.invoker
            .invoke_and_record(&agent, &license.user_id, input)
            .await
            .inspect_err(|e| {
                error!(
                    "License {} spent a unit on agent {} but the execution was not recorded: {}",
                    license.id, agent.id, e
                );
            })
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

/// Map a negative validation onto the error the caller sees.
fn rejection(reason: Option<InvalidReason>, license: Option<License>) -> CoreError {
    match reason {
        Some(InvalidReason::NotActive) => CoreError::LicenseRejected(LicenseRejection::NotActive),
        Some(InvalidReason::Expired) => CoreError::LicenseRejected(LicenseRejection::Expired),
        Some(InvalidReason::LimitReached) => {
            let limit = license
                .and_then(|l| l.max_executions)
                .unwrap_or_default();
            QuotaViolation::LicenseExecutions { limit }.into()
        }
        Some(InvalidReason::NotFound) | None => CoreError::not_found("license"),
    }
}
