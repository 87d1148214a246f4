//! User records: registration, subscription tier changes, profile edits.
//!
//! Identity issuance lives outside the platform. This only keeps the row the
//! enforcement core reads its plan from.

use crate::error::{CoreError, CoreResult};
use crate::state::SharedDb;
use crate::types::{Plan, User, UserStats};
use chrono::{SubsecRound, Utc};
use tracing::info;

#[derive(Clone)]
pub struct UserService {
    db: SharedDb,
}

impl UserService {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Persist a new FREE user.
    pub async fn register_user(&self, email: &str, name: &str) -> CoreResult<User> {
        let email = email.trim().to_ascii_lowercase();
        let name = name.trim();
        if !email.contains('@') {
            return Err(CoreError::ValidationFailure(format!(
                "invalid email '{email}'"
            )));
        }
        if name.is_empty() {
            return Err(CoreError::ValidationFailure("name must not be empty".into()));
        }

        let user = User {
            id: ulid::Ulid::new().to_string(),
            email,
            name: name.to_string(),
            avatar: None,
            plan: Plan::default(),
            created_at: Utc::now().trunc_subsecs(3),
        };

        let db = self.db.lock().await;
        match db.insert_user(&user) {
            Ok(()) => {}
            Err(e) if e.is_constraint_violation() => {
                return Err(CoreError::ValidationFailure(format!(
                    "email '{}' is already registered",
                    user.email
                )));
            }
            Err(e) => return Err(e),
        }

        info!("Registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    pub async fn get(&self, user_id: &str) -> CoreResult<User> {
        let db = self.db.lock().await;
        db.get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user"))
    }

    /// Consume a tier-change fact from billing.
    ///
    /// A downgrade archives nothing; it only narrows future admissions.
    pub async fn apply_plan_change(&self, user_id: &str, plan: Plan) -> CoreResult<User> {
        let db = self.db.lock().await;
        if !db.set_user_plan(user_id, plan)? {
            return Err(CoreError::not_found("user"));
        }
        info!("User {} moved to {} plan", user_id, plan);
        db.get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user"))
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> CoreResult<User> {
        if name.is_some_and(|n| n.trim().is_empty()) {
            return Err(CoreError::ValidationFailure("name must not be empty".into()));
        }

        let db = self.db.lock().await;
        if !db.update_user_profile(user_id, name.map(str::trim), avatar)? {
            return Err(CoreError::not_found("user"));
        }
        db.get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user"))
    }

    pub async fn stats(&self, user_id: &str) -> CoreResult<UserStats> {
        let db = self.db.lock().await;
        db.get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user"))?;
        db.user_stats(user_id)
    }
}
