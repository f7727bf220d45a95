//! Configuration loading for the Lattice runtime.
//!
//! Layered with figment, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. `lattice.toml` (or the file given to [`ConfigLoader::file`])
//! 3. Environment variables (`LATTICE_*`, `__` as section separator —
//!    `LATTICE_LOGGING__LEVEL=debug` → `logging.level = "debug"`)
//!
//! # Example
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "compact"
//!
//! [storage]
//! path = "./data/lattice.json"
//!
//! [platform]
//! application_id = "1234"
//! token = "…"
//! api_base = "https://chat.example.com/api"
//!
//! [plugins]
//! disabled = ["word_filter"]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub platform: PlatformConfig,
    pub plugins: PluginsConfig,
}

/// Log level names accepted in config files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Required when `output = "file"`.
    pub file_path: Option<PathBuf>,
    /// Per-module level overrides, e.g. `lattice_framework = "trace"`.
    pub filters: BTreeMap<String, LogLevel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the JSON key-value document. In-memory when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Application id in the platform's remote command catalog.
    pub application_id: String,
    /// Bot token presented on outbound calls.
    pub token: String,
    /// Base URL of the platform's REST API.
    pub api_base: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugins `load_all` must skip regardless of persisted state.
    pub disabled: Vec<String>,
}

impl LatticeConfig {
    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.logging.output == LogOutput::File && self.logging.file_path.is_none() {
            return Err(ConfigError::Invalid(
                "logging.output = \"file\" requires logging.file_path".into(),
            ));
        }
        if self.plugins.disabled.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "plugins.disabled contains an empty name".into(),
            ));
        }
        Ok(())
    }

    /// True when the platform section is complete enough to publish a
    /// command manifest.
    pub fn can_deploy_manifest(&self) -> bool {
        !self.platform.application_id.is_empty()
            && !self.platform.token.is_empty()
            && !self.platform.api_base.is_empty()
    }
}

// ─── Loader ──────────────────────────────────────────────────────────────────

/// Default config file searched in the working directory.
const DEFAULT_CONFIG_FILE: &str = "lattice.toml";

/// Layered configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: PathBuf,
    with_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_CONFIG_FILE),
            with_env: true,
        }
    }

    /// Uses a specific config file instead of `lattice.toml`.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = path.into();
        self
    }

    /// Disables the `LATTICE_*` environment provider.
    pub fn without_env(mut self) -> Self {
        self.with_env = false;
        self
    }

    /// Loads, merges, and validates the configuration. A missing config
    /// file is fine — defaults plus environment apply.
    pub fn load(&self) -> ConfigResult<LatticeConfig> {
        let mut figment = Figment::from(Serialized::defaults(LatticeConfig::default()))
            .merge(Toml::file(&self.file));
        if self.with_env {
            figment = figment.merge(Env::prefixed("LATTICE_").split("__"));
        }
        let config: LatticeConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }
}
