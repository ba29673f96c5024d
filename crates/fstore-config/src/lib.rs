//! # fstore-config
//!
//! Configuration management for fstore.
//!
//! Loads configuration from:
//! 1. `~/.fstore/config.toml` (global)
//! 2. `.fstore/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod duration;
pub mod logging;
pub mod testing;

pub use duration::{format_duration, parse_duration};
pub use logging::{init_logging, LogLevel};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding `storage.root`.
pub const ENV_ROOT: &str = "FSTORE_ROOT";
/// Environment variable overriding `gc.lifetime`.
pub const ENV_LIFETIME: &str = "FSTORE_LIFETIME";
/// Environment variable overriding `log.level`.
pub const ENV_LOG: &str = "FSTORE_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },
    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub gc: GcConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Load global config (~/.fstore/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::read_file(&global_path)?;
            }
        }

        // 2. Load project config (.fstore/config.toml) - overrides global
        let project_path = Path::new(".fstore/config.toml");
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            config.merge(Self::read_file(project_path)?);
        }

        // 3. Apply environment variable overrides
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load a single explicit config file, then apply env overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {:?}", path);
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.fstore/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".fstore/config.toml"))
    }

    /// Merge another config (project overrides).
    ///
    /// Only fields that differ from the defaults replace ours.
    fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.storage.root != defaults.storage.root {
            self.storage.root = other.storage.root;
        }
        if other.storage.prefix != defaults.storage.prefix {
            self.storage.prefix = other.storage.prefix;
        }
        if other.gc.lifetime != defaults.gc.lifetime {
            self.gc.lifetime = other.gc.lifetime;
        }
        if other.log.level != defaults.log.level {
            self.log.level = other.log.level;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var(ENV_ROOT) {
            self.storage.root = PathBuf::from(path);
        }
        if let Ok(lifetime) = std::env::var(ENV_LIFETIME) {
            self.gc.lifetime = lifetime;
        }
        if let Ok(level) = std::env::var(ENV_LOG) {
            self.log.level = level
                .parse()
                .map_err(|_| ConfigError::InvalidLogLevel(level))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.gc.lifetime()?;
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store root directory; a leading `~/` is expanded
    pub root: PathBuf,
    /// Default prefix directory under the root
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("~/.fstore/blobs"),
            prefix: String::new(),
        }
    }
}

impl StorageConfig {
    /// Root with `~/` expanded against the home directory.
    pub fn resolved_root(&self) -> PathBuf {
        expand_home(&self.root)
    }
}

/// Garbage collection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Blob lifetime, e.g. "720h" or "30d". "0" removes everything.
    pub lifetime: String,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            lifetime: "720h".to_string(),
        }
    }
}

impl GcConfig {
    pub fn lifetime(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.lifetime)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

/// Expand a leading `~/` using the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.root, PathBuf::from("~/.fstore/blobs"));
        assert_eq!(config.gc.lifetime().unwrap(), Duration::from_secs(720 * 3600));
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[gc]"));
        assert!(toml_str.contains("lifetime = \"720h\""));
        assert!(toml_str.contains("level = \"info\""));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut global: Config = toml::from_str(
            r#"
[storage]
root = "/srv/blobs"

[gc]
lifetime = "24h"
"#,
        )
        .unwrap();
        let project: Config = toml::from_str("[gc]\nlifetime = \"1h\"\n").unwrap();

        global.merge(project);
        assert_eq!(global.storage.root, PathBuf::from("/srv/blobs"));
        assert_eq!(global.gc.lifetime, "1h");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/blobs")), home.join("blobs"));
        }
    }
}
