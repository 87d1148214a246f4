//! Agent catalogue: tenant-owned agents, their lifecycle, and invocation.

pub mod execution;
pub mod service;

pub use service::AgentService;

use crate::error::{CoreError, CoreResult};
use crate::types::{AgentStatus, ComplexityTier};
use serde::{Deserialize, Serialize};

/// Fields supplied when creating an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_specialty")]
    pub specialty: String,
    #[serde(default)]
    pub complexity: ComplexityTier,
    pub system_prompt: String,
    /// Must be a JSON object when present. Defaults to `{}`.
    #[serde(default)]
    pub instructions: Option<serde_json::Value>,
}

fn default_specialty() -> String {
    "CUSTOM".into()
}

/// Partial update. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub specialty: Option<String>,
    pub complexity: Option<ComplexityTier>,
    pub system_prompt: Option<String>,
    pub instructions: Option<serde_json::Value>,
    pub status: Option<AgentStatus>,
}

impl AgentPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::ValidationFailure(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

pub(crate) fn require_object(value: &serde_json::Value) -> CoreResult<()> {
    if !value.is_object() {
        return Err(CoreError::ValidationFailure(
            "instructions must be a JSON object".into(),
        ));
    }
    Ok(())
}
