//! Mocks and fixtures shared by Weft test suites.

pub mod fixtures;
pub mod mocks;

pub use mocks::{MockAdapter, MockToolExecutor, RecordingSink, StaticCredentials};

use weft_core::config::EngineConfig;

/// Engine settings with short limits so failing tests fail fast.
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        max_steps: 50,
        node_timeout_secs: 5,
        max_concurrent_runs: 4,
        strict_edges: false,
        fail_on_missing_branch: false,
    }
}
