//! Configuration module for offsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ResolutionStrategy;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for offsync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub conflicts: ConflictsConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Sync queue and coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Failed deliveries tolerated before an item is escalated to the conflict queue.
    pub max_retries: u32,
    /// Seconds to wait after a reconnect before draining.
    pub settle_delay_secs: u64,
    /// Seconds between periodic drains while online.
    pub periodic_interval_secs: u64,
    /// Minimum seconds between two delivery attempts of the same item.
    pub retry_delay_secs: u64,
    /// Upper bound, in seconds, for any single remote call.
    pub remote_timeout_secs: u64,
}

impl SyncConfig {
    /// Checks the values the coordinator cannot run with
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.max_retries == 0 {
            errors.push(ValidationError {
                field: "sync.max_retries".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.periodic_interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.periodic_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.remote_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "sync.remote_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        errors
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

/// A key-pattern override of the default resolution strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRule {
    /// Glob pattern matched against the logical key (e.g. `"goal_*"`).
    pub pattern: String,
    /// Strategy applied when the pattern matches.
    pub strategy: ResolutionStrategy,
}

/// Conflict resolution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictsConfig {
    /// Process-wide strategy: `server_wins`, `client_wins`, `merge`, or `manual`.
    pub default_strategy: ResolutionStrategy,
    /// Optional per-key overrides, first match wins.
    pub rules: Vec<StrategyRule>,
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL every endpoint is appended to.
    pub base_url: String,
    /// Path probed to decide whether the backend is reachable.
    pub probe_path: String,
    /// Seconds between connectivity probes.
    pub probe_interval_secs: u64,
    /// Bearer token sent with every request, if any.
    pub auth_token: Option<String>,
}

/// Local persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the engine state.
    pub database: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/offsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("offsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            settle_delay_secs: 2,
            periodic_interval_secs: 300,
            retry_delay_secs: 5,
            remote_timeout_secs: 30,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            probe_path: "/health".to_string(),
            probe_interval_secs: 15,
            auth_token: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("offsync");
        Self {
            database: data_dir.join("offsync.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_retries"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        errors.extend(self.sync.validate());

        // --- conflicts ---
        for (index, rule) in self.conflicts.rules.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("conflicts.rules[{index}].pattern"),
                    message: "must not be empty".into(),
                });
            }
        }

        // --- remote ---
        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL: {}", self.remote.base_url),
            });
        }
        if !self.remote.probe_path.starts_with('/') {
            errors.push(ValidationError {
                field: "remote.probe_path".into(),
                message: "must start with '/'".into(),
            });
        }
        if self.remote.probe_interval_secs == 0 {
            errors.push(ValidationError {
                field: "remote.probe_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use offsync_core::config::ConfigBuilder;
/// use offsync_core::domain::ResolutionStrategy;
///
/// let config = ConfigBuilder::new()
///     .sync_max_retries(5)
///     .conflicts_default_strategy(ResolutionStrategy::Merge)
///     .remote_base_url("https://api.example.com")
///     .build();
/// assert_eq!(config.sync.max_retries, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn sync_settle_delay_secs(mut self, seconds: u64) -> Self {
        self.config.sync.settle_delay_secs = seconds;
        self
    }

    pub fn sync_periodic_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.periodic_interval_secs = seconds;
        self
    }

    pub fn sync_retry_delay_secs(mut self, seconds: u64) -> Self {
        self.config.sync.retry_delay_secs = seconds;
        self
    }

    pub fn sync_remote_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.sync.remote_timeout_secs = seconds;
        self
    }

    // --- conflicts ---

    pub fn conflicts_default_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.config.conflicts.default_strategy = strategy;
        self
    }

    pub fn conflicts_rule(mut self, pattern: impl Into<String>, strategy: ResolutionStrategy) -> Self {
        self.config.conflicts.rules.push(StrategyRule {
            pattern: pattern.into(),
            strategy,
        });
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_probe_path(mut self, path: impl Into<String>) -> Self {
        self.config.remote.probe_path = path.into();
        self
    }

    pub fn remote_probe_interval_secs(mut self, seconds: u64) -> Self {
        self.config.remote.probe_interval_secs = seconds;
        self
    }

    pub fn remote_auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.remote.auth_token = Some(token.into());
        self
    }

    // --- storage ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
