//! Seam to the paid completion provider.

use crate::types::ComplexityTier;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// The two messages sent for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Text and token usage returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub text: Option<String>,
    pub tokens_used: u64,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("inference failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed inference response: {0}")]
    Malformed(String),
}

/// Anything that can turn a prompt into a completion.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn invoke(
        &self,
        prompt: &Prompt,
        tier: ComplexityTier,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError>;
}
