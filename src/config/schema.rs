//! Configuration schema for agentmint.toml.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Path to the SQLite database.
    pub db_path: String,

    /// Base URL of the OpenAI-compatible inference provider.
    pub inference_api_url: String,

    /// Bearer token for the inference provider.
    pub inference_api_key: String,

    /// Upper bound on a single provider call.
    pub inference_timeout_secs: u64,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.agentmint/platform.db".into(),
            inference_api_url: "https://api.openai.com".into(),
            inference_api_key: String::new(),
            inference_timeout_secs: 60,
            log_level: "info".into(),
        }
    }
}

impl PlatformConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs.max(1))
    }
}
