//! License authority: mints, validates, meters and revokes license keys.

use crate::error::{CoreError, CoreResult, LicenseRejection, QuotaViolation};
use crate::license::key;
use crate::license::lifecycle::{
    due_transition, next_status, InvalidReason, LicenseEvent, LicenseTerms, LicenseValidation,
};
use crate::state::{Database, SharedDb};
use crate::types::{AgentStatus, License, LicenseStatus, LicenseType};
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng};
use tracing::{debug, info, warn};

/// Re-rolls allowed before giving up on finding an unused key.
const MAX_KEY_ATTEMPTS: u32 = 8;

/// Draw keys until one is not present in the store.
pub fn generate_unique_key<R: Rng + CryptoRng>(db: &Database, rng: &mut R) -> CoreResult<String> {
    for attempt in 1..=MAX_KEY_ATTEMPTS {
        let candidate = key::generate(rng);
        if !db.license_key_exists(&candidate)? {
            return Ok(candidate);
        }
        warn!("License key collision (attempt {})", attempt);
    }
    Err(CoreError::KeyCollision {
        attempts: MAX_KEY_ATTEMPTS,
    })
}

/// Mint an ACTIVE license for an agent owned by `owner_id`.
pub fn issue_in<R: Rng + CryptoRng>(
    db: &Database,
    rng: &mut R,
    owner_id: &str,
    agent_id: &str,
    license_type: LicenseType,
    now: DateTime<Utc>,
) -> CoreResult<License> {
    db.find_agent_owned(agent_id, owner_id)?
        .filter(|agent| agent.status != AgentStatus::Archived)
        .ok_or_else(|| CoreError::not_found("agent"))?;

    let terms = LicenseTerms::for_type(license_type, now);

    for _ in 0..MAX_KEY_ATTEMPTS {
        let license = License {
            id: ulid::Ulid::new().to_string(),
            key: generate_unique_key(db, rng)?,
            agent_id: agent_id.to_string(),
            user_id: owner_id.to_string(),
            license_type,
            status: LicenseStatus::Active,
            expires_at: terms.expires_at,
            max_executions: terms.max_executions,
            used_executions: 0,
            created_at: now,
        };

        match db.insert_license(&license) {
            Ok(()) => {
                info!(
                    "Issued {} license {} for agent {}",
                    license_type, license.id, agent_id
                );
                return Ok(license);
            }
            // Another instance persisted the same key between check and insert
            Err(e) if e.is_constraint_violation() => {
                warn!("License key taken at insert time, re-rolling");
            }
            Err(e) => return Err(e),
        }
    }

    Err(CoreError::KeyCollision {
        attempts: MAX_KEY_ATTEMPTS,
    })
}

/// Validate `raw_key` at time `now`, applying lazy expiry when due.
///
/// This mutates storage: an overdue ACTIVE license is moved to EXPIRED here.
pub fn validate_in(db: &Database, raw_key: &str, now: DateTime<Utc>) -> CoreResult<LicenseValidation> {
    let normalized = raw_key.trim().to_ascii_uppercase();
    if !key::is_well_formed(&normalized) {
        return Err(CoreError::ValidationFailure(format!(
            "malformed license key '{}'",
            raw_key.trim()
        )));
    }

    let Some(license) = db.find_license_by_key(&normalized)? else {
        return Ok(LicenseValidation::invalid(InvalidReason::NotFound));
    };

    if license.status.is_terminal() {
        return Ok(LicenseValidation::invalid(InvalidReason::NotActive));
    }

    if let Some(next) = due_transition(&license, now) {
        if db.transition_license_status(&license.id, license.status, next)? {
            info!("License {} expired (observed at validation)", license.id);
        } else {
            debug!("License {} changed status concurrently", license.id);
        }
        return Ok(LicenseValidation::invalid(InvalidReason::Expired));
    }

    if license.limit_reached() {
        return Ok(LicenseValidation::invalid(InvalidReason::LimitReached));
    }

    Ok(LicenseValidation::valid(license))
}

/// Claim one execution against an ACTIVE, unexpired license in a single
/// conditional update. A failed claim is explained by re-reading the row.
pub fn increment_usage_in(db: &Database, key: &str, now: DateTime<Utc>) -> CoreResult<()> {
    if db.increment_license_usage(key, now)? {
        return Ok(());
    }

    let Some(license) = db.find_license_by_key(key)? else {
        return Err(CoreError::not_found("license"));
    };

    if license.status.is_terminal() {
        warn!("Refusing claim on {} license {}", license.status, license.id);
        return Err(CoreError::LicenseRejected(LicenseRejection::NotActive));
    }
    if license.expires_at.is_some_and(|deadline| deadline <= now) {
        warn!("Refusing claim on overdue license {}", license.id);
        return Err(CoreError::LicenseRejected(LicenseRejection::Expired));
    }

    let limit = license.max_executions.unwrap_or(license.used_executions);
    warn!("License {} is at its execution limit ({})", license.id, limit);
    Err(QuotaViolation::LicenseExecutions { limit }.into())
}

/// Revoke an owned license. Idempotent; terminal states are left as they are.
pub fn revoke_in(db: &Database, id: &str, owner_id: &str) -> CoreResult<License> {
    let license = db
        .find_license_owned(id, owner_id)?
        .ok_or_else(|| CoreError::not_found("license"))?;

    match next_status(license.status, LicenseEvent::Revoke) {
        Some(to) => {
            if db.transition_license_status(id, license.status, to)? {
                info!("Revoked license {}", id);
            }
        }
        None => debug!("License {} already {}; revoke is a no-op", id, license.status),
    }

    db.find_license_owned(id, owner_id)?
        .ok_or_else(|| CoreError::not_found("license"))
}

/// Async front for license operations over a shared database.
#[derive(Clone)]
pub struct LicenseAuthority {
    db: SharedDb,
}

impl LicenseAuthority {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// A fresh key not currently present in the store.
    pub async fn generate_key(&self) -> CoreResult<String> {
        let db = self.db.lock().await;
        generate_unique_key(&db, &mut OsRng)
    }

    pub async fn issue(
        &self,
        owner_id: &str,
        agent_id: &str,
        license_type: LicenseType,
    ) -> CoreResult<License> {
        let now = Utc::now().trunc_subsecs(3);
        let db = self.db.lock().await;
        issue_in(&db, &mut OsRng, owner_id, agent_id, license_type, now)
    }

    pub async fn validate(&self, key: &str) -> CoreResult<LicenseValidation> {
        let db = self.db.lock().await;
        validate_in(&db, key, Utc::now())
    }

    pub async fn increment_usage(&self, key: &str) -> CoreResult<()> {
        let db = self.db.lock().await;
        increment_usage_in(&db, key, Utc::now())
    }

    pub async fn revoke(&self, id: &str, owner_id: &str) -> CoreResult<License> {
        let db = self.db.lock().await;
        revoke_in(&db, id, owner_id)
    }

    /// All licenses issued by `owner_id`, newest first.
    pub async fn list(&self, owner_id: &str) -> CoreResult<Vec<License>> {
        let db = self.db.lock().await;
        db.list_licenses(owner_id)
    }
}
