//! On-disk configuration for the hassmodel event core.
//!
//! A TOML file layered with `HASSMODEL_*` environment variables, validated
//! and translated to `hassmodel_core::ModelConfig`. The core never reads
//! files itself; embedding applications call [`load_model_config`] (or
//! build a `ModelConfig` by hand).

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hassmodel_core::{DEFAULT_QUEUE_CAPACITY, ModelConfig, RegistryEventKind};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `HASSMODEL_QUEUE__CAPACITY=4096`.
pub const ENV_PREFIX: &str = "HASSMODEL_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub dispose: DisposeSettings,

    #[serde(default)]
    pub registry: RegistrySettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueSettings {
    /// Items buffered per queue before the oldest are dropped.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Fill ratio that triggers the backlog warning, in `(0, 1]`.
    #[serde(default = "default_near_capacity_ratio")]
    pub near_capacity_ratio: f64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            near_capacity_ratio: default_near_capacity_ratio(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DisposeSettings {
    /// How long dispose waits for background work.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for DisposeSettings {
    fn default() -> Self {
        Self {
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistrySettings {
    /// Event types that trigger a rebuild of the registry indexes.
    #[serde(default = "default_registry_events")]
    pub events: Vec<RegistryEventKind>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            events: default_registry_events(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_near_capacity_ratio() -> f64 {
    0.9
}
fn default_flush_timeout_ms() -> u64 {
    5_000
}
fn default_registry_events() -> Vec<RegistryEventKind> {
    RegistryEventKind::all().to_vec()
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::Validation {
                field: "queue.capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        let ratio = self.queue.near_capacity_ratio;
        if ratio.is_nan() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ConfigError::Validation {
                field: "queue.near_capacity_ratio".into(),
                reason: format!("expected a value in (0, 1], got {ratio}"),
            });
        }
        Ok(())
    }

    /// Validate and translate to the core's runtime config.
    pub fn to_model_config(&self) -> Result<ModelConfig, ConfigError> {
        self.validate()?;
        Ok(ModelConfig {
            queue_capacity: self.queue.capacity,
            near_capacity_ratio: self.queue.near_capacity_ratio,
            flush_timeout: Duration::from_millis(self.dispose.flush_timeout_ms),
            registry_events: self.registry.events.clone(),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "hassmodel", "hassmodel").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hassmodel");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load from `path` + environment. A missing file yields the defaults
/// (plus any environment overrides).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and translate to `ModelConfig` in one step.
pub fn load_model_config() -> Result<ModelConfig, ConfigError> {
    load_config()?.to_model_config()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent
/// directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
