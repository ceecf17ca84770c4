//! Configuration loader
//!
//! Loads configuration from:
//! 1. Default values
//! 2. A TOML file, `./interrupt-engine.toml` unless a path is given
//! 3. `INTERRUPT_ENGINE_*` environment variables
//!
//! Later sources override earlier ones.

use crate::config::schema::InterruptEngineConfig;
use crate::error::{InterruptError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const DEFAULT_CONFIG_FILE: &str = "interrupt-engine.toml";
const ENV_PREFIX: &str = "INTERRUPT_ENGINE_";

/// Configuration loader for file and environment sources
pub struct ConfigLoader {
    path: PathBuf,
    required: bool,
}

impl ConfigLoader {
    /// Loader for `./interrupt-engine.toml`; a missing file falls back to defaults
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CONFIG_FILE),
            required: false,
        }
    }

    /// Loader for an explicit file, which must exist
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load configuration with file and environment overrides applied
    pub async fn load(&self) -> Result<InterruptEngineConfig> {
        let mut config = if self.path.exists() {
            let config = Self::load_from_path(&self.path).await?;
            debug!(path = %self.path.display(), "Loaded config file");
            config
        } else if self.required {
            return Err(InterruptError::Config(format!(
                "Config file not found: {}",
                self.path.display()
            )));
        } else {
            debug!(path = %self.path.display(), "Config file not found, using defaults");
            InterruptEngineConfig::default()
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    async fn load_from_path(path: &Path) -> Result<InterruptEngineConfig> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| InterruptError::Config(format!("Failed to read config: {}", e)))?;

        parse_config(&content)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a TOML document into a configuration
pub fn parse_config(content: &str) -> Result<InterruptEngineConfig> {
    toml::from_str(content)
        .map_err(|e| InterruptError::Config(format!("Failed to parse config: {}", e)))
}

/// Apply `INTERRUPT_ENGINE_*` overrides using `lookup` to read variables
pub fn apply_env_overrides<F>(config: &mut InterruptEngineConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    if let Some(path) = var("DATABASE_PATH") {
        config.database.path = path;
    }
    if let Some(value) = var("LOCK_WAIT_TIMEOUT_MS") {
        config.lock.wait_timeout_ms = parse_number("LOCK_WAIT_TIMEOUT_MS", &value)?;
    }
    if let Some(value) = var("LOCK_LEASE_TTL_SECS") {
        config.lock.lease_ttl_secs = parse_number("LOCK_LEASE_TTL_SECS", &value)?;
    }
    if let Some(value) = var("DISCONTINUE_GRACE_SECS") {
        config.monitor.discontinue_grace_secs = parse_number("DISCONTINUE_GRACE_SECS", &value)?;
    }
    if let Some(value) = var("EXPIRY_TIMEOUT_SECS") {
        config.expiry.callback_timeout_secs = parse_number("EXPIRY_TIMEOUT_SECS", &value)?;
    }
    if let Some(value) = var("PARKED_TTL_SECS") {
        config.expiry.parked_ttl_secs = parse_number("PARKED_TTL_SECS", &value)?;
    }
    if let Some(value) = var("SWEEP_INTERVAL_SECS") {
        config.sweeper.interval_secs = parse_number("SWEEP_INTERVAL_SECS", &value)?;
    }
    if let Some(level) = var("LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(())
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        InterruptError::Config(format!(
            "{}{} must be a non-negative integer, got {:?}",
            ENV_PREFIX, name, value
        ))
    })
}
