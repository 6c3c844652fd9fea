pub mod memory;
pub mod store;

use std::sync::Arc;

use tracing::info;

use weft_core::config::StoreConfig;
use weft_core::error::Result;
use weft_core::traits::ExecutionStore;

pub use memory::MemoryStore;
pub use store::SqliteStore;

/// Open the configured store: SQLite when a path is set, otherwise in-memory.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn ExecutionStore>> {
    match config.resolved_path() {
        Some(path) => Ok(Arc::new(SqliteStore::open(&path)?)),
        None => {
            info!("No store path configured, executions will not outlive this process");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
