//! Pipe configuration.
//!
//! Loaded once at startup from a YAML file, with environment variable
//! overrides. The resulting record is read-only for the life of the process.
//!
//! ```yaml
//! redis:
//!   host: localhost
//!   port: 6379
//!   password: ""
//!   database: 0
//!   key: suricata
//!   block_secs: 0
//!   timeout_ms: 5000
//! amqp:
//!   name: amqp-pipe
//!   host: localhost
//!   port: 5672
//!   username: guest
//!   password: guest
//!   exchange: suricata
//! relay:
//!   poll_interval_ms: 1000
//!   reconnect_delay_ms: 5000
//! ```
//!
//! Any field can be overridden from the environment, e.g.
//! `AMQP_PIPE__AMQP__PASSWORD=secret`.

use std::time::Duration;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "amqp-pipe.yml";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "AMQP_PIPE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "AMQP_PIPE_LOG";
/// Environment variable selecting `text` or `json` log output.
pub const LOG_FORMAT_ENV_VAR: &str = "AMQP_PIPE_LOG_FORMAT";
/// The well-known list key events are popped from.
pub const DEFAULT_EVENT_KEY: &str = "suricata";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source queue.
    pub redis: RedisConfig,
    /// Destination exchange.
    pub amqp: AmqpConfig,
    /// Worker timing.
    pub relay: RelayConfig,
}

/// Source queue connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Empty means no AUTH.
    pub password: String,
    /// Logical database index.
    pub database: i64,
    /// List key events are popped from.
    pub key: String,
    /// Seconds a pop may block waiting for an event. 0 = non-blocking LPOP.
    pub block_secs: u64,
    /// Upper bound for any single command (on top of `block_secs`).
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            database: 0,
            key: DEFAULT_EVENT_KEY.to_string(),
            block_secs: 0,
            timeout_ms: 5000,
        }
    }
}

impl RedisConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Exchange connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    /// Connection name reported to the broker.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Fanout exchange events are published to.
    pub exchange: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            name: "amqp-pipe".to_string(),
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            exchange: DEFAULT_EVENT_KEY.to_string(),
        }
    }
}

impl AmqpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Worker timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Pause after an empty pop, a failed pop, or while waiting. Default: 1s.
    pub poll_interval_ms: u64,
    /// Fixed delay between reconnect attempts. Default: 5s.
    pub reconnect_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            reconnect_delay_ms: 5000,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables prefixed with `CONFIG_ENV_PREFIX`
    /// 2. The YAML file at `path` (must exist)
    /// 3. Defaults
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let config = ConfigLib::builder()
            .add_source(File::new(path, FileFormat::Yaml).required(true))
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a single YAML file, without environment overrides.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}
