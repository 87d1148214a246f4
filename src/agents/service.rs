//! Agent CRUD and lifecycle over the shared database.

use crate::agents::{require_object, require_text, AgentPatch, NewAgent};
use crate::error::{CoreError, CoreResult, QuotaViolation};
use crate::ledger::Invoker;
use crate::quota::enforcer::admit_create_in;
use crate::quota::PlanLimits;
use crate::state::{Database, SharedDb};
use crate::types::{Agent, AgentPage, AgentQuery, AgentStatus};
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

/// Largest page `list` will return.
const MAX_PAGE_SIZE: u64 = 100;

/// How often a status move is retried after losing a compare-and-set.
const STATUS_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct AgentService {
    pub(super) db: SharedDb,
    pub(super) invoker: Invoker,
}

impl AgentService {
    pub fn new(db: SharedDb, invoker: Invoker) -> Self {
        Self { db, invoker }
    }

    /// Create a DRAFT agent if the owner's plan has room for one more.
    pub async fn create(&self, owner_id: &str, new: NewAgent) -> CoreResult<Agent> {
        let db = self.db.lock().await;
        create_in(&db, owner_id, new, now())
    }

    pub async fn get(&self, agent_id: &str, owner_id: &str) -> CoreResult<Agent> {
        let db = self.db.lock().await;
        find_owned(&db, agent_id, owner_id)
    }

    pub async fn list(&self, owner_id: &str, query: &AgentQuery) -> CoreResult<AgentPage> {
        let query = AgentQuery {
            page: query.page.max(1),
            limit: query.limit.clamp(1, MAX_PAGE_SIZE),
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ..query.clone()
        };

        let db = self.db.lock().await;
        let (data, total) = db.list_agents(owner_id, &query)?;
        Ok(AgentPage {
            data,
            total,
            page: query.page,
            limit: query.limit,
            total_pages: total.div_ceil(query.limit),
        })
    }

    /// Apply `patch` to an owned agent and bump its version.
    pub async fn update(&self, agent_id: &str, owner_id: &str, patch: AgentPatch) -> CoreResult<Agent> {
        let db = self.db.lock().await;
        update_in(&db, agent_id, owner_id, patch, now())
    }

    /// DRAFT -> ACTIVE. Publishing an ACTIVE agent returns it unchanged.
    pub async fn publish(&self, agent_id: &str, owner_id: &str) -> CoreResult<Agent> {
        let db = self.db.lock().await;
        move_status_in(&db, agent_id, owner_id, AgentStatus::Active, now())
    }

    /// Soft delete: move to ARCHIVED. Deleting an archived agent is a no-op.
    pub async fn delete(&self, agent_id: &str, owner_id: &str) -> CoreResult<Agent> {
        let db = self.db.lock().await;
        move_status_in(&db, agent_id, owner_id, AgentStatus::Archived, now())
    }

    /// Copy an owned agent into a new DRAFT named "<name> (Copy)". Counts as a create.
    pub async fn clone_agent(&self, agent_id: &str, owner_id: &str) -> CoreResult<Agent> {
        let db = self.db.lock().await;
        let source = find_owned(&db, agent_id, owner_id)?;
        if source.status == AgentStatus::Archived {
            return Err(CoreError::not_found("agent"));
        }

        let copy = NewAgent {
            name: format!("{} (Copy)", source.name),
            description: source.description,
            specialty: source.specialty,
            complexity: source.complexity,
            system_prompt: source.system_prompt,
            instructions: Some(source.instructions),
        };
        create_in(&db, owner_id, copy, now())
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub(crate) fn find_owned(db: &Database, agent_id: &str, owner_id: &str) -> CoreResult<Agent> {
    db.find_agent_owned(agent_id, owner_id)?
        .ok_or_else(|| CoreError::not_found("agent"))
}

/// Scoped lookup that also hides soft-deleted agents.
pub(crate) fn find_live(db: &Database, agent_id: &str, owner_id: &str) -> CoreResult<Agent> {
    db.find_agent_owned(agent_id, owner_id)?
        .filter(|agent| agent.status != AgentStatus::Archived)
        .ok_or_else(|| CoreError::not_found("agent"))
}

pub(crate) fn create_in(
    db: &Database,
    owner_id: &str,
    new: NewAgent,
    now: DateTime<Utc>,
) -> CoreResult<Agent> {
    require_text("name", &new.name)?;
    require_text("systemPrompt", &new.system_prompt)?;
    let instructions = new.instructions.unwrap_or_else(|| serde_json::json!({}));
    require_object(&instructions)?;

    let plan = admit_create_in(db, owner_id)?;
    let limit = PlanLimits::for_plan(plan).max_active_agents;

    let agent = Agent {
        id: ulid::Ulid::new().to_string(),
        user_id: owner_id.to_string(),
        name: new.name.trim().to_string(),
        description: new.description,
        specialty: new.specialty,
        complexity: new.complexity,
        system_prompt: new.system_prompt,
        instructions,
        status: AgentStatus::Draft,
        version: 1,
        created_at: now,
        updated_at: now,
    };

    // The pre-check above can race with another instance; the conditional insert cannot
    if !db.insert_agent_within(&agent, limit)? {
        let limit = limit.unwrap_or_default();
        warn!("Agent create for {} lost the race for the last slot", owner_id);
        return Err(QuotaViolation::ActiveAgents { plan, limit }.into());
    }

    info!("Created agent {} for {}", agent.id, owner_id);
    Ok(agent)
}

fn update_in(
    db: &Database,
    agent_id: &str,
    owner_id: &str,
    patch: AgentPatch,
    now: DateTime<Utc>,
) -> CoreResult<Agent> {
    let current = find_owned(db, agent_id, owner_id)?;
    if current.status == AgentStatus::Archived {
        let to = patch.status.unwrap_or(current.status);
        return Err(CoreError::transition("agent", current.status, to));
    }
    if let Some(to) = patch.status {
        if !current.status.can_transition_to(to) {
            return Err(CoreError::transition("agent", current.status, to));
        }
    }
    if patch.is_empty() {
        return Ok(current);
    }

    let mut next = current.clone();
    if let Some(name) = patch.name {
        require_text("name", &name)?;
        next.name = name.trim().to_string();
    }
    if let Some(description) = patch.description {
        next.description = Some(description);
    }
    if let Some(specialty) = patch.specialty {
        next.specialty = specialty;
    }
    if let Some(complexity) = patch.complexity {
        next.complexity = complexity;
    }
    if let Some(prompt) = patch.system_prompt {
        require_text("systemPrompt", &prompt)?;
        next.system_prompt = prompt;
    }
    if let Some(instructions) = patch.instructions {
        require_object(&instructions)?;
        next.instructions = instructions;
    }
    if let Some(status) = patch.status {
        next.status = status;
    }
    next.version = current.version + 1;
    next.updated_at = now;

    if !db.update_agent(&next, current.version)? {
        return Err(match db.find_agent_owned(agent_id, owner_id)? {
            None => CoreError::not_found("agent"),
            Some(a) if a.status == AgentStatus::Archived => {
                CoreError::transition("agent", a.status, next.status)
            }
            Some(_) => CoreError::Conflict { entity: "agent" },
        });
    }

    if next.status != current.status {
        info!("Agent {} {} -> {}", agent_id, current.status, next.status);
    }
    debug!("Updated agent {} to version {}", agent_id, next.version);
    Ok(next)
}

/// Move an owned agent to `to` along the lifecycle. Reaching a state it is
/// already in is a no-op, except that nothing leaves ARCHIVED.
fn move_status_in(
    db: &Database,
    agent_id: &str,
    owner_id: &str,
    to: AgentStatus,
    now: DateTime<Utc>,
) -> CoreResult<Agent> {
    for _ in 0..STATUS_RETRIES {
        let current = find_owned(db, agent_id, owner_id)?;
        if current.status == to {
            return Ok(current);
        }
        if !current.status.can_transition_to(to) {
            return Err(CoreError::transition("agent", current.status, to));
        }

        if db.transition_agent_status(agent_id, owner_id, current.status, to, now)? {
            info!("Agent {} {} -> {}", agent_id, current.status, to);
            return find_owned(db, agent_id, owner_id);
        }
        debug!("Agent {} changed status concurrently, re-reading", agent_id);
    }
    Err(CoreError::Conflict { entity: "agent" })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::QuotaViolation;
    use crate::inference::testing::ScriptedGateway;
    use crate::ledger::ExecutionLedger;
    use crate::state::database::tests::user;
    use crate::state::shared;
    use crate::types::{ComplexityTier, Plan};
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn new_agent(name: &str) -> NewAgent {
        NewAgent {
            name: name.to_string(),
            description: Some("answers billing questions".into()),
            specialty: "SUPPORT".into(),
            complexity: ComplexityTier::Intermediate,
            system_prompt: "You are a billing assistant".into(),
            instructions: None,
        }
    }

    pub(crate) fn service_with(db: Database, gateway: Arc<ScriptedGateway>) -> AgentService {
        let db = shared(db);
        let invoker = Invoker::new(
            ExecutionLedger::new(db.clone()),
            gateway,
            Duration::from_secs(5),
        );
        AgentService::new(db, invoker)
    }

    fn service_for(plan: Plan) -> AgentService {
        let db = Database::open_memory().unwrap();
        db.insert_user(&user("u1", plan)).unwrap();
        db.insert_user(&user("u2", Plan::Free)).unwrap();
        service_with(db, Arc::new(ScriptedGateway::replying("ok", 1)))
    }

    #[tokio::test]
    async fn create_starts_in_draft() {
        let agents = service_for(Plan::Free);

        let agent = agents.create("u1", new_agent("Billing bot")).await.unwrap();

        assert_eq!(agent.status, AgentStatus::Draft);
        assert_eq!(agent.version, 1);
        assert_eq!(agent.instructions, serde_json::json!({}));
        assert_eq!(agents.get(&agent.id, "u1").await.unwrap(), agent);
    }

    #[tokio::test]
    async fn create_beyond_tier_limit_is_rejected() {
        for (plan, limit) in [(Plan::Free, 2), (Plan::Basic, 10), (Plan::Pro, 50)] {
            let agents = service_for(plan);
            for i in 0..limit {
                agents.create("u1", new_agent(&format!("a{i}"))).await.unwrap();
            }

            let err = agents.create("u1", new_agent("one more")).await.unwrap_err();

            assert!(
                matches!(
                    err,
                    CoreError::QuotaExceeded(QuotaViolation::ActiveAgents { limit: l, .. }) if l == limit
                ),
                "{plan}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn enterprise_create_is_never_rejected() {
        let agents = service_for(Plan::Enterprise);

        for i in 0..75 {
            agents.create("u1", new_agent(&format!("a{i}"))).await.unwrap();
        }
    }

    #[tokio::test]
    async fn archiving_frees_a_slot() {
        let agents = service_for(Plan::Free);
        let first = agents.create("u1", new_agent("first")).await.unwrap();
        agents.create("u1", new_agent("second")).await.unwrap();

        agents.delete(&first.id, "u1").await.unwrap();

        assert!(agents.create("u1", new_agent("third")).await.is_ok());
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let agents = service_for(Plan::Free);

        let mut blank = new_agent("  ");
        assert!(matches!(
            agents.create("u1", blank.clone()).await,
            Err(CoreError::ValidationFailure(_))
        ));

        blank.name = "named".into();
        blank.instructions = Some(serde_json::json!(["not", "an", "object"]));
        assert!(matches!(
            agents.create("u1", blank).await,
            Err(CoreError::ValidationFailure(_))
        ));
    }

    #[tokio::test]
    async fn other_tenants_cannot_see_or_touch() {
        let agents = service_for(Plan::Free);
        let agent = agents.create("u1", new_agent("private")).await.unwrap();

        assert!(matches!(agents.get(&agent.id, "u2").await, Err(CoreError::NotFound { .. })));
        assert!(matches!(
            agents.update(&agent.id, "u2", AgentPatch::default()).await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(agents.delete(&agent.id, "u2").await, Err(CoreError::NotFound { .. })));
        assert!(matches!(agents.clone_agent(&agent.id, "u2").await, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_bumps_version_and_keeps_untouched_fields() {
        let agents = service_for(Plan::Free);
        let agent = agents.create("u1", new_agent("Billing bot")).await.unwrap();

        let updated = agents
            .update(
                &agent.id,
                "u1",
                AgentPatch {
                    complexity: Some(ComplexityTier::Supreme),
                    status: Some(AgentStatus::Active),
                    ..AgentPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.complexity, ComplexityTier::Supreme);
        assert_eq!(updated.status, AgentStatus::Active);
        assert_eq!(updated.name, agent.name);
        assert_eq!(agents.get(&agent.id, "u1").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn status_never_moves_backwards() {
        let agents = service_for(Plan::Free);
        let agent = agents.create("u1", new_agent("Billing bot")).await.unwrap();
        agents.publish(&agent.id, "u1").await.unwrap();

        let err = agents
            .update(
                &agent.id,
                "u1",
                AgentPatch {
                    status: Some(AgentStatus::Draft),
                    ..AgentPatch::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn archived_agents_are_immutable() {
        let agents = service_for(Plan::Free);
        let agent = agents.create("u1", new_agent("Billing bot")).await.unwrap();

        let archived = agents.delete(&agent.id, "u1").await.unwrap();
        assert_eq!(archived.status, AgentStatus::Archived);

        // Deleting again is a no-op
        assert_eq!(agents.delete(&agent.id, "u1").await.unwrap(), archived);

        let rename = AgentPatch {
            name: Some("renamed".into()),
            ..AgentPatch::default()
        };
        assert!(matches!(
            agents.update(&agent.id, "u1", rename).await,
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            agents.publish(&agent.id, "u1").await,
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn publish_is_idempotent() {
        let agents = service_for(Plan::Free);
        let agent = agents.create("u1", new_agent("Billing bot")).await.unwrap();

        let first = agents.publish(&agent.id, "u1").await.unwrap();
        let second = agents.publish(&agent.id, "u1").await.unwrap();

        assert_eq!(first.status, AgentStatus::Active);
        assert_eq!(second, first);
        // Status moves do not bump the edit version
        assert_eq!(second.version, 1);
    }

    #[tokio::test]
    async fn clone_is_a_create() {
        let agents = service_for(Plan::Free);
        let agent = agents.create("u1", new_agent("Billing bot")).await.unwrap();
        agents.publish(&agent.id, "u1").await.unwrap();

        let copy = agents.clone_agent(&agent.id, "u1").await.unwrap();
        assert_eq!(copy.name, "Billing bot (Copy)");
        assert_eq!(copy.status, AgentStatus::Draft);
        assert_ne!(copy.id, agent.id);
        assert_eq!(copy.system_prompt, agent.system_prompt);

        // FREE allows two; a third copy must be refused
        assert!(matches!(
            agents.clone_agent(&agent.id, "u1").await,
            Err(CoreError::QuotaExceeded(_))
        ));
    }

    #[tokio::test]
    async fn list_pages_and_filters() {
        let agents = service_for(Plan::Pro);
        for i in 0..12 {
            let mut new = new_agent(&format!("agent {i:02}"));
            if i % 3 == 0 {
                new.specialty = "SALES".into();
            }
            agents.create("u1", new).await.unwrap();
        }

        let page = agents
            .list(
                "u1",
                &AgentQuery {
                    page: 2,
                    limit: 5,
                    ..AgentQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data.len(), 5);

        let sales = agents
            .list(
                "u1",
                &AgentQuery {
                    specialty: Some("SALES".into()),
                    ..AgentQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(sales.total, 4);

        let search = agents
            .list(
                "u1",
                &AgentQuery {
                    search: Some("AGENT 1".into()),
                    ..AgentQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(search.total, 2);

        let empty = agents.list("u2", &AgentQuery::default()).await.unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn creates_from_separate_connections_never_exceed_plan_bound() {
        const N: usize = 12;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.db");
        Database::open(&path)
            .unwrap()
            .insert_user(&user("u1", Plan::Free))
            .unwrap();

        let barrier = Arc::new(std::sync::Barrier::new(N));
        let threads: Vec<_> = (0..N)
            .map(|i| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let db = Database::open(&path).unwrap();
                    barrier.wait();
                    create_in(&db, "u1", new_agent(&format!("racer {i}")), Utc::now())
                })
            })
            .collect();

        let mut created = 0;
        for t in threads {
            match t.join().unwrap() {
                Ok(agent) => {
                    assert_eq!(agent.status, AgentStatus::Draft);
                    created += 1;
                }
                Err(CoreError::QuotaExceeded(QuotaViolation::ActiveAgents { limit: 2, .. })) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created, 2);
        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_active_agents("u1").unwrap(), 2);
    }
}
