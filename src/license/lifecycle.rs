//! License terms and status transitions.
//!
//! ```text
//! ACTIVE --(deadline observed by validate)--> EXPIRED
//! ACTIVE --(revoke)-------------------------> REVOKED
//! ```
//! EXPIRED and REVOKED have no outgoing edges.

use crate::types::{License, LicenseStatus, LicenseType};
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// What can happen to a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// `validate` observed `expires_at` in the past.
    DeadlinePassed,
    /// The owner revoked the license.
    Revoke,
}

/// The status reached from `current` on `event`, or `None` if there is no such edge.
pub fn next_status(current: LicenseStatus, event: LicenseEvent) -> Option<LicenseStatus> {
    match (current, event) {
        (LicenseStatus::Active, LicenseEvent::DeadlinePassed) => Some(LicenseStatus::Expired),
        (LicenseStatus::Active, LicenseEvent::Revoke) => Some(LicenseStatus::Revoked),
        (LicenseStatus::Expired | LicenseStatus::Revoked, _) => None,
    }
}

/// Lazy expiry: the transition `validate` must apply before answering, if any.
///
/// A read with a write side effect. There is no background sweeper, so an
/// overdue license keeps reporting ACTIVE until the next validation.
pub fn due_transition(license: &License, now: DateTime<Utc>) -> Option<LicenseStatus> {
    match license.expires_at {
        Some(deadline) if deadline < now => {
            next_status(license.status, LicenseEvent::DeadlinePassed)
        }
        _ => None,
    }
}

/// Expiry and execution bound granted by a license type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseTerms {
    pub expires_at: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    pub max_executions: Option<u64>,
}

impl LicenseTerms {
    pub fn for_type(license_type: LicenseType, now: DateTime<Utc>) -> Self {
        let (days, max) = match license_type {
            LicenseType::Trial => (Some(7), Some(100)),
            LicenseType::Monthly => (Some(30), Some(10_000)),
            LicenseType::Yearly => (Some(365), Some(120_000)),
            LicenseType::Lifetime | LicenseType::WhiteLabel => (None, None),
        };
        Self {
            expires_at: days.map(|d| now + Duration::days(d)),
            max_executions: max,
        }
    }
}

/// Why `validate` said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NotFound,
    NotActive,
    Expired,
    LimitReached,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "License not found"),
            Self::NotActive => write!(f, "License is not active"),
            Self::Expired => write!(f, "License expired"),
            Self::LimitReached => write!(f, "Execution limit reached"),
        }
    }
}

impl Serialize for InvalidReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Answer to `validate(key)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

impl LicenseValidation {
    pub fn valid(license: License) -> Self {
        Self {
            valid: true,
            reason: None,
            license: Some(license),
        }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            license: None,
        }
    }
}
