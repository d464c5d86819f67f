//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.cinefluent/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_API_BASE;
use crate::health::MonitorOptions;
use crate::query::DEFAULT_CAPACITY;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CineFluentConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    pub capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HealthConfig {
    pub poll_interval_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const ENV_API_BASE: &str = "CINEFLUENT_API_BASE";
pub const ENV_TOKEN: &str = "CINEFLUENT_TOKEN";
pub const ENV_USER_ID: &str = "CINEFLUENT_USER_ID";

const DEFAULT_CONFIG: &str = r#"# CineFluent Configuration
# All settings are optional. Defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [api]
# base_url = "https://cinefluent-api-production.up.railway.app/api/v1"  # Or CINEFLUENT_API_BASE
# access_token = "eyJ..."            # Or CINEFLUENT_TOKEN, or `cinefluent login`
# user_id = "..."                    # Or CINEFLUENT_USER_ID

# [cache]
# capacity = 256                     # Entries kept before least-recently-used eviction

# [health]
# poll_interval_secs = 30
# max_attempts = 3                   # Probe attempts before the backend counts as down
# backoff_base_ms = 1000             # Doubles after each failed attempt
"#;

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub cache_capacity: usize,
    pub monitor: MonitorOptions,
}

/// Values given on the command line. `None` = not specified.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.cinefluent/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".cinefluent").join("config.toml"))
}

/// Load config from `~/.cinefluent/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `CineFluentConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<CineFluentConfig, ConfigError> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => {
            warn!("Could not determine home directory, using default config");
            Ok(CineFluentConfig::default())
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<CineFluentConfig, ConfigError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(CineFluentConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: CineFluentConfig = toml::from_str(&contents)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

fn generate_default_config(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, DEFAULT_CONFIG) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
pub fn resolve(config: &CineFluentConfig, cli: &CliOverrides) -> ResolvedConfig {
    resolve_with_env(config, cli, |name| std::env::var(name).ok())
}

/// [`resolve`] with an injectable environment lookup.
pub fn resolve_with_env(
    config: &CineFluentConfig,
    cli: &CliOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    // Base URL: CLI → env → config → default
    let base_url = non_empty(cli.base_url.clone())
        .or_else(|| non_empty(env(ENV_API_BASE)))
        .or_else(|| non_empty(config.api.base_url.clone()))
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

    let access_token = non_empty(cli.access_token.clone())
        .or_else(|| non_empty(env(ENV_TOKEN)))
        .or_else(|| non_empty(config.api.access_token.clone()));

    let user_id = non_empty(cli.user_id.clone())
        .or_else(|| non_empty(env(ENV_USER_ID)))
        .or_else(|| non_empty(config.api.user_id.clone()));

    ResolvedConfig {
        base_url,
        access_token,
        user_id,
        cache_capacity: resolve_capacity(config.cache.capacity),
        monitor: resolve_monitor(&config.health),
    }
}

fn resolve_capacity(capacity: Option<usize>) -> usize {
    match capacity {
        Some(0) => {
            warn!("cache.capacity must be at least 1, using {}", DEFAULT_CAPACITY);
            DEFAULT_CAPACITY
        }
        Some(n) => n,
        None => DEFAULT_CAPACITY,
    }
}

fn resolve_monitor(health: &HealthConfig) -> MonitorOptions {
    let defaults = MonitorOptions::default();

    let poll_interval = match health.poll_interval_secs {
        Some(0) => {
            warn!("health.poll_interval_secs must be positive, using default");
            defaults.poll_interval
        }
        Some(secs) => Duration::from_secs(secs),
        None => defaults.poll_interval,
    };

    let mut retry = defaults.retry;
    if let Some(attempts) = health.max_attempts {
        retry = retry.with_max_attempts(attempts.max(1));
    }
    if let Some(ms) = health.backoff_base_ms {
        retry = retry.with_backoff(Duration::from_millis(ms), retry.backoff_multiplier);
    }

    MonitorOptions {
        poll_interval,
        retry,
    }
}
