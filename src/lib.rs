//! Agentmint: tenant-owned AI agents sold through usage-bounded license keys.
//!
//! The core decides, under concurrent access, whether an agent may be created
//! or executed. It mints and validates license keys and keeps the append-only
//! execution ledger that both enforcement and analytics read from.

pub mod agents;
pub mod analytics;
pub mod config;
pub mod error;
pub mod inference;
pub mod ledger;
pub mod license;
pub mod platform;
pub mod quota;
pub mod state;
pub mod types;
pub mod users;

pub use error::{CoreError, CoreResult};
pub use platform::Platform;
