//! # Node Host Configuration
//!
//! Runtime settings for a node host. The rig tables themselves are compiled
//! in (see `rig.rs`); this file only selects which node this process is and
//! tunes its loop.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [node]
//! address = 1
//!
//! [timing]
//! poll_interval_ms = 5
//! time_delta_override_ms = 250
//!
//! [logging]
//! level = "debug"
//! ```

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodeSettings;
use crate::rig::NodeAddress;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for a node host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of this node on the rig bus.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Address read from the address-sense pin; 0 is the master.
    #[serde(default)]
    pub address: u8,
}

/// Control loop timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Frame period used instead of the node type's `default_time_delta`.
    #[serde(default)]
    pub time_delta_override_ms: Option<u32>,
    /// Chain timeout used instead of the node type's `default_timeout`.
    #[serde(default)]
    pub timeout_override_ms: Option<u32>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            time_delta_override_ms: None,
            timeout_override_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<tracing::Level, ConfigError> {
        self.level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".to_string()));
        }
        if self.timing.time_delta_override_ms == Some(0) {
            return Err(ConfigError::Invalid("time_delta_override_ms must be > 0".to_string()));
        }
        if self.timing.timeout_override_ms == Some(0) {
            return Err(ConfigError::Invalid("timeout_override_ms must be > 0".to_string()));
        }
        self.logging.max_level()?;
        Ok(())
    }

    pub fn address(&self) -> NodeAddress {
        NodeAddress(self.node.address)
    }

    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            time_delta_override: self.timing.time_delta_override_ms,
            timeout_override: self.timing.timeout_override_ms,
        }
    }
}

fn default_poll_interval_ms() -> u64 { 5 }
fn default_log_level() -> String { "info".to_string() }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}

/// Loads `path` while `startup` is the active subscriber, for use before the
/// configured one is installed. A missing file yields the defaults.
pub fn load_startup_config<S>(path: &str, startup: S) -> Result<Config, ConfigError>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    if !std::path::Path::new(path).exists() {
        return Ok(Config::default());
    }
    tracing::subscriber::with_default(startup, || load_config(path))
}
