//! Plan policy table: subscription tier -> resource bounds.
//!
//! The table is compiled in. `None` means the resource is unbounded.

use crate::error::QuotaViolation;
use crate::types::Plan;

/// Bounds granted by a subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_active_agents: Option<u64>,
    pub max_daily_executions: Option<u64>,
}

impl PlanLimits {
    pub const fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => Self {
                max_active_agents: Some(2),
                max_daily_executions: Some(1_000),
            },
            Plan::Basic => Self {
                max_active_agents: Some(10),
                max_daily_executions: Some(10_000),
            },
            Plan::Pro => Self {
                max_active_agents: Some(50),
                max_daily_executions: Some(100_000),
            },
            Plan::Enterprise => Self {
                max_active_agents: None,
                max_daily_executions: None,
            },
        }
    }
}

/// Decide whether one more agent fits next to `active` existing ones.
pub fn check_agent_quota(plan: Plan, active: u64) -> Result<(), QuotaViolation> {
    match PlanLimits::for_plan(plan).max_active_agents {
        Some(limit) if active >= limit => Err(QuotaViolation::ActiveAgents { plan, limit }),
        _ => Ok(()),
    }
}

/// Decide whether one more execution fits next to `today` already recorded.
pub fn check_execution_quota(plan: Plan, today: u64) -> Result<(), QuotaViolation> {
    match PlanLimits::for_plan(plan).max_daily_executions {
        Some(limit) if today >= limit => Err(QuotaViolation::DailyExecutions { plan, limit }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_limits_per_plan() {
        assert!(check_agent_quota(Plan::Free, 1).is_ok());
        assert_eq!(
            check_agent_quota(Plan::Free, 2),
            Err(QuotaViolation::ActiveAgents {
                plan: Plan::Free,
                limit: 2
            })
        );
        assert!(check_agent_quota(Plan::Basic, 9).is_ok());
        assert!(check_agent_quota(Plan::Basic, 10).is_err());
        assert!(check_agent_quota(Plan::Pro, 49).is_ok());
        assert!(check_agent_quota(Plan::Pro, 50).is_err());
        assert!(check_agent_quota(Plan::Enterprise, u64::MAX).is_ok());
    }

    #[test]
    fn execution_limits_per_plan() {
        assert!(check_execution_quota(Plan::Free, 999).is_ok());
        assert!(check_execution_quota(Plan::Free, 1_000).is_err());
        assert!(check_execution_quota(Plan::Basic, 10_000).is_err());
        assert!(check_execution_quota(Plan::Pro, 99_999).is_ok());
        assert!(check_execution_quota(Plan::Pro, 100_000).is_err());
        assert!(check_execution_quota(Plan::Enterprise, u64::MAX).is_ok());
    }
}
