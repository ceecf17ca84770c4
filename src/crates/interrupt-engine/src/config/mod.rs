//! Configuration management for the interrupt engine
//!
//! Values come from, in increasing priority:
//! 1. Built-in defaults
//! 2. A TOML file (`interrupt-engine.toml` or an explicit path)
//! 3. `INTERRUPT_ENGINE_*` environment variables

mod loader;
mod schema;

pub use loader::{apply_env_overrides, parse_config, ConfigLoader};
pub use schema::{
    DatabaseConfig, EndWorkerConfig, ExpiryConfig, InterruptEngineConfig, LockConfig,
    LoggingConfig, MonitorConfig, SweeperConfig,
};

use crate::Result;

/// Load configuration from the default location
pub async fn load_config() -> Result<InterruptEngineConfig> {
    ConfigLoader::new().load().await
}
