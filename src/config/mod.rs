use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::protocol::DEFAULT_MAX_LINE_LENGTH;
use crate::ring::{parse_hash, KeyRange};

/// Complete node configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RingstoreConfig {
    pub node: NodeConfig,
    pub cache: CacheConfig,
    pub cluster: ClusterConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Client protocol bind address
    pub listen_addr: SocketAddr,
    /// Admin HTTP API bind address
    pub admin_addr: SocketAddr,
    /// Directory holding kvstorage.txt
    pub data_dir: PathBuf,
    /// Node name (optional, for display purposes)
    pub name: Option<String>,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Replacement strategy
    pub policy: CachePolicy,
    /// Maximum number of cached pairs; 0 disables the cache
    pub capacity: usize,
}

/// Initial ring ownership, normally overwritten by the rebalancing service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    /// Low bound of the owned range, 32 hex digits
    pub range_low: Option<String>,
    /// High bound of the owned range, 32 hex digits
    pub range_high: Option<String>,
    /// Start with writes rejected
    pub write_locked: bool,
}

impl ClusterConfig {
    pub fn key_range(&self) -> Result<Option<KeyRange>, ConfigError> {
        let low = self.range_low.as_deref().map(parse_hash).transpose();
        let high = self.range_high.as_deref().map(parse_hash).transpose();
        let (low, high) = (
            low.map_err(|e| ConfigError::Validation(e.to_string()))?,
            high.map_err(|e| ConfigError::Validation(e.to_string()))?,
        );
        KeyRange::from_bounds(low, high).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

/// Client connection configuration
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Maximum encoded request size (in bytes)
    pub max_line_length: usize,
    /// How long a graceful stop waits for open connections
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub shutdown_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty, compact)
    pub format: LogFormat,
    /// Log file path (None = stdout)
    pub file_path: Option<PathBuf>,
    /// Enable ANSI colors in output
    pub enable_colors: bool,
}

/// Log output format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 50000)),
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 50080)),
            data_dir: PathBuf::from("./data"),
            name: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::Fifo,
            capacity: 10,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
            enable_colors: true,
        }
    }
}

/// Configuration loading and management
impl RingstoreConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.listen_addr == self.node.admin_addr {
            return Err(ConfigError::Validation(
                "Listen and admin addresses cannot be the same".to_string(),
            ));
        }

        if self.network.max_line_length == 0 {
            return Err(ConfigError::Validation(
                "max_line_length must be greater than 0".to_string(),
            ));
        }

        self.cluster.key_range()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Get default configuration file paths
    pub fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("ringstore.toml"),
            PathBuf::from("config/ringstore.toml"),
            PathBuf::from("/etc/ringstore/config.toml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ringstore").join("config.toml"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".ringstore.toml"));
        }

        paths
    }

    /// Find and load configuration file from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        for path in Self::default_config_paths() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // No config file found, return default configuration
        Ok(Self::default())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
