//! Configuration management.
//!
//! Engine settings come from a TOML file, then environment overrides:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `MAPSTORE_MAPPING_DIR` | `mapping_dir` |
//! | `MAPSTORE_RESOLUTION_MODE` | `resolution_mode` |
//! | `MAPSTORE_LOG_LEVEL` | `logging.level` |

use crate::bootstrap::ResolutionMode;
use crate::observability::LogFormat;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::mapping::LoadPolicy;

/// Connection settings for one connection key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Provider name, e.g. `sqlite`.
    pub provider_name: String,
    /// Provider-specific connection string.
    pub connection_string: String,
}

impl ConnectionSettings {
    /// Settings for a `SQLite` database.
    #[must_use]
    pub fn sqlite(connection_string: impl Into<String>) -> Self {
        Self {
            provider_name: "sqlite".to_string(),
            connection_string: connection_string.into(),
        }
    }
}

/// Resolves a connection key to connection settings.
pub trait ConnectionResolver: Send + Sync {
    /// Returns the settings for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `key` is not configured.
    fn resolve(&self, key: &str) -> Result<ConnectionSettings>;
}

impl ConnectionResolver for HashMap<String, ConnectionSettings> {
    fn resolve(&self, key: &str) -> Result<ConnectionSettings> {
        self.get(key).cloned().ok_or_else(|| unknown_connection(key))
    }
}

fn unknown_connection(key: &str) -> Error {
    Error::Configuration(format!("no connection configured for key '{key}'"))
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `mapstore=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Main configuration for mapstore.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding mapping files.
    pub mapping_dir: PathBuf,
    /// Mapping file extension, without the dot.
    pub mapping_extension: String,
    /// Behaviour when a mapping file fails to parse.
    pub load_policy: LoadPolicy,
    /// Behaviour when several storages implement the same interface.
    pub resolution_mode: ResolutionMode,
    /// Timeout for commands that declare none.
    pub default_timeout: Option<Duration>,
    /// Connection settings by key.
    pub connections: HashMap<String, ConnectionSettings>,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mapping_dir: PathBuf::from("sql"),
            mapping_extension: crate::mapping::DEFAULT_MAPPING_EXTENSION.to_string(),
            load_policy: LoadPolicy::default(),
            resolution_mode: ResolutionMode::default(),
            default_timeout: None,
            connections: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Mapping directory.
    pub mapping_dir: Option<String>,
    /// Mapping file extension.
    pub mapping_extension: Option<String>,
    /// `fail_fast` or `skip_invalid`.
    pub load_policy: Option<String>,
    /// `strict` or `lenient`.
    pub resolution_mode: Option<String>,
    /// Default command timeout in seconds.
    pub default_timeout_seconds: Option<u64>,
    /// Connections by key.
    #[serde(default)]
    pub connections: HashMap<String, ConfigFileConnection>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Connection section in config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileConnection {
    /// Provider name.
    pub provider: Option<String>,
    /// Connection string.
    pub connection_string: String,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// A relative `mapping_dir` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// unknown policy, mode or format name.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let mut config = Self::from_toml(&contents)?;
        if config.mapping_dir.is_relative()
            && let Some(parent) = path.parent()
        {
            config.mapping_dir = parent.join(&config.mapping_dir);
        }
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parses configuration TOML without applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for malformed TOML or unknown names.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("invalid config file: {e}")))?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir (`<config>/mapstore/config.toml`), then
    /// `~/.config/mapstore/config.toml`. Falls back to defaults (with
    /// environment overrides) when neither exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but is invalid.
    pub fn load_default() -> Result<Self> {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            let candidates = [
                base_dirs.config_dir().join("mapstore").join("config.toml"),
                base_dirs
                    .home_dir()
                    .join(".config")
                    .join("mapstore")
                    .join("config.toml"),
            ];
            if let Some(path) = candidates.iter().find(|p| p.exists()) {
                tracing::debug!(path = %path.display(), "loading config file");
                return Self::load_from_file(path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Converts a `ConfigFile` to `EngineConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = file.mapping_dir {
            config.mapping_dir = PathBuf::from(dir);
        }
        if let Some(extension) = file.mapping_extension {
            config.mapping_extension = extension.trim_start_matches('.').to_string();
        }
        if let Some(policy) = file.load_policy {
            config.load_policy = LoadPolicy::parse(&policy)
                .ok_or_else(|| Error::Configuration(format!("unknown load_policy '{policy}'")))?;
        }
        if let Some(mode) = file.resolution_mode {
            config.resolution_mode = parse_resolution_mode(&mode)?;
        }
        config.default_timeout = file.default_timeout_seconds.map(Duration::from_secs);

        for (key, connection) in file.connections {
            let provider = connection.provider.unwrap_or_else(|| "sqlite".to_string());
            config.connections.insert(
                key,
                ConnectionSettings {
                    provider_name: provider,
                    connection_string: connection.connection_string,
                },
            );
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format)
                    .ok_or_else(|| Error::Configuration(format!("unknown log format '{format}'")))?;
            }
        }

        Ok(config)
    }

    /// Applies `MAPSTORE_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown resolution mode.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown resolution mode.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("MAPSTORE_MAPPING_DIR").filter(|v| !v.trim().is_empty()) {
            self.mapping_dir = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("MAPSTORE_RESOLUTION_MODE").filter(|v| !v.trim().is_empty()) {
            self.resolution_mode = parse_resolution_mode(&mode)?;
        }
        if let Some(level) = lookup("MAPSTORE_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Sets the mapping directory.
    #[must_use]
    pub fn with_mapping_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.mapping_dir = path.into();
        self
    }

    /// Sets the resolution mode.
    #[must_use]
    pub const fn with_resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.resolution_mode = mode;
        self
    }

    /// Sets the load policy.
    #[must_use]
    pub const fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Adds a connection.
    #[must_use]
    pub fn with_connection(mut self, key: impl Into<String>, settings: ConnectionSettings) -> Self {
        self.connections.insert(key.into(), settings);
        self
    }
}

impl ConnectionResolver for EngineConfig {
    fn resolve(&self, key: &str) -> Result<ConnectionSettings> {
        self.connections.resolve(key)
    }
}

fn parse_resolution_mode(mode: &str) -> Result<ResolutionMode> {
    ResolutionMode::parse(mode)
        .ok_or_else(|| Error::Configuration(format!("unknown resolution_mode '{mode}'")))
}
