//! Shared domain types used across the platform core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored or user-supplied enum label is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription plans
// ---------------------------------------------------------------------------

/// Subscription tier of a user. Changed only by billing facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "FREE"),
            Self::Basic => write!(f, "BASIC"),
            Self::Pro => write!(f, "PRO"),
            Self::Enterprise => write!(f, "ENTERPRISE"),
        }
    }
}

impl FromStr for Plan {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "BASIC" => Ok(Self::Basic),
            "PRO" => Ok(Self::Pro),
            "ENTERPRISE" => Ok(Self::Enterprise),
            _ => Err(UnknownVariant::new("plan", s)),
        }
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::Free
    }
}

// ---------------------------------------------------------------------------
// Agent lifecycle
// ---------------------------------------------------------------------------

/// Agent lifecycle: DRAFT -> ACTIVE -> ARCHIVED. ARCHIVED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Draft,
    Active,
    Archived,
}

impl AgentStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Active => 1,
            Self::Archived => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the monotonic lifecycle.
    ///
    /// Staying in place is allowed except for ARCHIVED, which accepts nothing.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        if self == Self::Archived {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Archived => write!(f, "ARCHIVED"),
        }
    }
}

impl FromStr for AgentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "ACTIVE" => Ok(Self::Active),
            "ARCHIVED" => Ok(Self::Archived),
            _ => Err(UnknownVariant::new("agent status", s)),
        }
    }
}

/// Complexity tier of an agent. Selects the provider model and token ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplexityTier {
    Basic,
    Intermediate,
    Advanced,
    Supreme,
}

impl ComplexityTier {
    /// Provider model used for this tier.
    pub fn model(self) -> &'static str {
        match self {
            Self::Basic => "gpt-3.5-turbo",
            Self::Intermediate => "gpt-4",
            Self::Advanced => "gpt-4-turbo",
            Self::Supreme => "gpt-4o",
        }
    }

    /// Completion token ceiling for this tier.
    pub fn max_tokens(self) -> u32 {
        match self {
            Self::Basic => 1000,
            Self::Intermediate => 2000,
            Self::Advanced => 4000,
            Self::Supreme => 8000,
        }
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "BASIC"),
            Self::Intermediate => write!(f, "INTERMEDIATE"),
            Self::Advanced => write!(f, "ADVANCED"),
            Self::Supreme => write!(f, "SUPREME"),
        }
    }
}

impl FromStr for ComplexityTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BASIC" => Ok(Self::Basic),
            "INTERMEDIATE" => Ok(Self::Intermediate),
            "ADVANCED" => Ok(Self::Advanced),
            "SUPREME" => Ok(Self::Supreme),
            _ => Err(UnknownVariant::new("complexity tier", s)),
        }
    }
}

impl Default for ComplexityTier {
    fn default() -> Self {
        Self::Basic
    }
}

// ---------------------------------------------------------------------------
// Licenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseType {
    Trial,
    Monthly,
    Yearly,
    Lifetime,
    WhiteLabel,
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trial => write!(f, "TRIAL"),
            Self::Monthly => write!(f, "MONTHLY"),
            Self::Yearly => write!(f, "YEARLY"),
            Self::Lifetime => write!(f, "LIFETIME"),
            Self::WhiteLabel => write!(f, "WHITE_LABEL"),
        }
    }
}

impl FromStr for LicenseType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "TRIAL" => Ok(Self::Trial),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            "LIFETIME" => Ok(Self::Lifetime),
            "WHITE_LABEL" => Ok(Self::WhiteLabel),
            _ => Err(UnknownVariant::new("license type", s)),
        }
    }
}

/// License status: ACTIVE -> EXPIRED | REVOKED. Both exits are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    Active,
    Expired,
    Revoked,
}

impl LicenseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Revoked => write!(f, "REVOKED"),
        }
    }
}

impl FromStr for LicenseStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED" => Ok(Self::Revoked),
            _ => Err(UnknownVariant::new("license status", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub plan: Plan,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub specialty: String,
    pub complexity: ComplexityTier,
    pub system_prompt: String,
    pub instructions: serde_json::Value,
    pub status: AgentStatus,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the execution ledger. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub input: serde_json::Value,
    pub output: Option<String>,
    pub tokens: u64,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub id: String,
    pub key: String,
    pub agent_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub license_type: LicenseType,
    pub status: LicenseStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// `None` means unlimited (stored as -1).
    pub max_executions: Option<u64>,
    pub used_executions: u64,
    pub created_at: DateTime<Utc>,
}

impl License {
    /// Whether the execution bound has been reached.
    pub fn limit_reached(&self) -> bool {
        self.max_executions
            .is_some_and(|max| self.used_executions >= max)
    }
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// What the caller learns about one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub execution_id: String,
    pub success: bool,
    pub output: Option<String>,
    pub tokens: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Execution> for ExecutionOutcome {
    fn from(execution: &Execution) -> Self {
        Self {
            execution_id: execution.id.clone(),
            success: execution.success,
            output: execution.output.clone(),
            tokens: execution.tokens,
            duration_ms: execution.duration_ms,
            error: execution.error.clone(),
        }
    }
}

/// Slim view of a ledger row used by analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub created_at: DateTime<Utc>,
    pub success: bool,
    pub duration_ms: u64,
    pub tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_executions: u64,
    pub successful_executions: u64,
    /// Percentage in [0, 100]; 0 when there are no executions.
    pub success_rate: f64,
    /// Mean duration in milliseconds; 0 when there are no executions.
    pub avg_duration: f64,
    pub total_tokens: u64,
    pub recent_executions: Vec<ExecutionSummary>,
}

/// Filters for listing a tenant's agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentQuery {
    pub status: Option<AgentStatus>,
    pub specialty: Option<String>,
    /// Case-insensitive match against name or description.
    pub search: Option<String>,
    /// 1-based.
    pub page: u64,
    pub limit: u64,
}

impl Default for AgentQuery {
    fn default() -> Self {
        Self {
            status: None,
            specialty: None,
            search: None,
            page: 1,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPage {
    pub data: Vec<Agent>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub agents_count: u64,
    pub executions_count: u64,
    pub licenses_count: u64,
}
