//! Session store implementations for ToolPilot.

pub mod file_store;
pub mod in_memory;

pub use file_store::FileSessionStore;
pub use in_memory::InMemorySessionStore;

use std::sync::Arc;
use toolpilot_core::SessionStore;

/// Build the configured session store.
pub fn build_from_config(config: &toolpilot_config::AppConfig) -> Arc<dyn SessionStore> {
    match config.sessions.backend.as_str() {
        "memory" => Arc::new(InMemorySessionStore::new()),
        _ => Arc::new(FileSessionStore::new(config.sessions.resolved_dir())),
    }
}
