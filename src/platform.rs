//! Wires the services together over one shared database and gateway.

use crate::agents::AgentService;
use crate::analytics::Analytics;
use crate::config::PlatformConfig;
use crate::error::CoreResult;
use crate::inference::{InferenceClient, InferenceGateway};
use crate::ledger::{ExecutionLedger, Invoker};
use crate::license::LicenseAuthority;
use crate::quota::QuotaEnforcer;
use crate::state::{shared, Database, SharedDb};
use crate::users::UserService;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Platform {
    pub users: UserService,
    pub agents: AgentService,
    pub licenses: LicenseAuthority,
    pub quota: QuotaEnforcer,
    pub analytics: Analytics,
}

impl Platform {
    pub fn new(db: SharedDb, gateway: Arc<dyn InferenceGateway>, timeout: Duration) -> Self {
        let invoker = Invoker::new(ExecutionLedger::new(db.clone()), gateway, timeout);
        Self {
            users: UserService::new(db.clone()),
            agents: AgentService::new(db.clone(), invoker),
            licenses: LicenseAuthority::new(db.clone()),
            quota: QuotaEnforcer::new(db.clone()),
            analytics: Analytics::new(db),
        }
    }

    /// Open the configured database and talk to the configured provider over HTTP.
    pub fn from_config(config: &PlatformConfig) -> CoreResult<Self> {
        let db_path = config.resolved_db_path();
        let db = Database::open(Path::new(&db_path))?;
        let gateway = InferenceClient::new(&config.inference_api_url, &config.inference_api_key);
        Ok(Self::new(
            shared(db),
            Arc::new(gateway),
            config.inference_timeout(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::NewAgent;
    use crate::inference::testing::ScriptedGateway;
    use crate::license::InvalidReason;
    use crate::types::{ComplexityTier, LicenseStatus, LicenseType, Plan};
    use serde_json::json;

    fn platform(gateway: ScriptedGateway) -> Platform {
        Platform::new(
            shared(Database::open_memory().unwrap()),
            Arc::new(gateway),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn tenant_journey() {
        let platform = platform(ScriptedGateway::replying("Refund issued", 33));

        let user = platform
            .users
            .register_user("owner@example.com", "Owner")
            .await
            .unwrap();
        platform.users.apply_plan_change(&user.id, Plan::Basic).await.unwrap();

        let agent = platform
            .agents
            .create(
                &user.id,
                NewAgent {
                    name: "Refund desk".into(),
                    description: None,
                    specialty: "SUPPORT".into(),
                    complexity: ComplexityTier::Advanced,
                    system_prompt: "You process refunds".into(),
                    instructions: Some(json!({"tone": "friendly"})),
                },
            )
            .await
            .unwrap();
        platform.agents.publish(&agent.id, &user.id).await.unwrap();

        let direct = platform
            .agents
            .execute(&agent.id, &user.id, json!({"order": 17}))
            .await
            .unwrap();
        assert!(direct.success);

        let license = platform
            .licenses
            .issue(&user.id, &agent.id, LicenseType::Monthly)
            .await
            .unwrap();
        let licensed = platform
            .agents
            .execute_with_license(&license.key, json!({"order": 18}))
            .await
            .unwrap();
        assert!(licensed.success);

        let summary = platform.analytics.summary(&agent.id, &user.id).await.unwrap();
        assert_eq!(summary.total_executions, 2);
        assert_eq!(summary.total_tokens, 66);
        assert_eq!(summary.success_rate, 100.0);

        let stats = platform.users.stats(&user.id).await.unwrap();
        assert_eq!(stats.agents_count, 1);
        assert_eq!(stats.executions_count, 2);
        assert_eq!(stats.licenses_count, 1);

        let revoked = platform.licenses.revoke(&license.id, &user.id).await.unwrap();
        assert_eq!(revoked.status, LicenseStatus::Revoked);
        let validation = platform.licenses.validate(&license.key).await.unwrap();
        assert_eq!(validation.reason, Some(InvalidReason::NotActive));

        let listed = platform.licenses.list(&user.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].used_executions, 1);

        assert!(platform.quota.admit_execute(&user.id).await.is_ok());
    }

    #[test]
    fn from_config_opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlatformConfig {
            db_path: dir.path().join("data").join("platform.db").display().to_string(),
            ..PlatformConfig::default()
        };

        assert!(Platform::from_config(&config).is_ok());
        assert!(dir.path().join("data").join("platform.db").exists());
    }
}
