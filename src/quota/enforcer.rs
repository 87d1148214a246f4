//! Quota enforcer: admits or rejects create/execute requests by plan.
//!
//! `admit_*` are read-then-decide checks. The paths that spend quota go
//! through single conditional writes instead (`reserve_execute_in`,
//! `Database::insert_agent_within`, `Database::increment_license_usage`),
//! which stay correct when requests race across connections.

use crate::error::{CoreError, CoreResult};
use crate::error::QuotaViolation;
use crate::quota::policy::{check_agent_quota, check_execution_quota, PlanLimits};
use crate::state::{Database, SharedDb};
use crate::types::Plan;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use tracing::{debug, warn};

/// Midnight UTC of the day containing `now`. Daily quotas reset here.
pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

/// Check whether `user_id` may hold one more non-archived agent.
///
/// Returns the user's plan so the caller can apply the same bound at insert time.
pub fn admit_create_in(db: &Database, user_id: &str) -> CoreResult<Plan> {
    let user = db
        .get_user(user_id)?
        .ok_or_else(|| CoreError::not_found("user"))?;
    let active = db.count_active_agents(user_id)?;

    if let Err(violation) = check_agent_quota(user.plan, active) {
        warn!("Rejecting agent create for {}: {}", user_id, violation);
        return Err(violation.into());
    }

    debug!("Admitted agent create for {} ({} active, plan {})", user_id, active, user.plan);
    Ok(user.plan)
}

/// Check whether `user_id` may run one more execution on the day of `now`.
pub fn admit_execute_in(db: &Database, user_id: &str, now: DateTime<Utc>) -> CoreResult<Plan> {
    let user = db
        .get_user(user_id)?
        .ok_or_else(|| CoreError::not_found("user"))?;
    let today = db.count_executions_since(user_id, start_of_utc_day(now))?;

    if let Err(violation) = check_execution_quota(user.plan, today) {
        warn!("Rejecting execution for {}: {}", user_id, violation);
        return Err(violation.into());
    }

    debug!("Admitted execution for {} ({} today, plan {})", user_id, today, user.plan);
    Ok(user.plan)
}

/// Claim one of today's execution slots for `user_id`, or fail with `QuotaExceeded`.
///
/// Unlike `admit_execute_in` this is a write: the slot stays taken whether or
/// not the provider call that follows succeeds.
pub fn reserve_execute_in(db: &Database, user_id: &str, now: DateTime<Utc>) -> CoreResult<Plan> {
    let user = db
        .get_user(user_id)?
        .ok_or_else(|| CoreError::not_found("user"))?;

    let Some(limit) = PlanLimits::for_plan(user.plan).max_daily_executions else {
        return Ok(user.plan);
    };

    if !db.reserve_daily_execution(user_id, start_of_utc_day(now), limit)? {
        warn!("Rejecting execution for {}: daily slots exhausted ({})", user_id, limit);
        return Err(QuotaViolation::DailyExecutions {
            plan: user.plan,
            limit,
        }
        .into());
    }

    debug!("Reserved execution slot for {} (plan {})", user_id, user.plan);
    Ok(user.plan)
}

/// Async front for the admission checks over a shared database.
#[derive(Clone)]
pub struct QuotaEnforcer {
    db: SharedDb,
}

impl QuotaEnforcer {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    pub async fn admit_create(&self, user_id: &str) -> CoreResult<Plan> {
        let db = self.db.lock().await;
        admit_create_in(&db, user_id)
    }

    pub async fn admit_execute(&self, user_id: &str) -> CoreResult<Plan> {
        let db = self.db.lock().await;
        admit_execute_in(&db, user_id, Utc::now())
    }
}
