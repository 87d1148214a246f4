pub mod database;
pub mod schema;

pub use database::{Database, ExecutionStats};

use std::sync::Arc;
use tokio::sync::Mutex;

/// Database handle shared between async services.
pub type SharedDb = Arc<Mutex<Database>>;

/// Wrap a database for sharing across services.
pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}
