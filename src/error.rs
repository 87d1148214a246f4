//! Error taxonomy for the enforcement core.

use crate::types::Plan;
use thiserror::Error;

/// Which bound a rejected request ran into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaViolation {
    #[error("agent limit of {limit} reached for {plan} plan; upgrade to create more agents")]
    ActiveAgents { plan: Plan, limit: u64 },

    #[error("daily execution limit of {limit} reached for {plan} plan; upgrade your plan")]
    DailyExecutions { plan: Plan, limit: u64 },

    #[error("license execution limit of {limit} reached")]
    LicenseExecutions { limit: u64 },
}

/// Why a known license key cannot be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LicenseRejection {
    #[error("License is not active")]
    NotActive,
    #[error("License expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Absent, or present but owned by someone else. The two are never distinguished.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(QuotaViolation),

    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("license rejected: {0}")]
    LicenseRejected(LicenseRejection),

    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// An optimistic version guard lost to a concurrent writer.
    #[error("{entity} was modified concurrently; retry")]
    Conflict { entity: &'static str },

    #[error("no unused license key after {attempts} attempts")]
    KeyCollision { attempts: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CoreError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub(crate) fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// A uniqueness or CHECK constraint rejected the write.
    pub(crate) fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Storage(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    /// Client-correctable failures, as opposed to infrastructure faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::QuotaExceeded(_)
                | Self::ValidationFailure(_)
                | Self::LicenseRejected(_)
                | Self::InvalidTransition { .. }
                | Self::Conflict { .. }
        )
    }
}

impl From<QuotaViolation> for CoreError {
    fn from(violation: QuotaViolation) -> Self {
        Self::QuotaExceeded(violation)
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_messages_name_the_plan() {
        let err = CoreError::from(QuotaViolation::ActiveAgents {
            plan: Plan::Free,
            limit: 2,
        });
        assert_eq!(
            err.to_string(),
            "quota exceeded: agent limit of 2 reached for FREE plan; upgrade to create more agents"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn storage_errors_are_not_client_errors() {
        let err = CoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_client_error());
    }
}
