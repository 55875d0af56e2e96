//! # Node Configuration
//!
//! Broker settings plus the parameters of the demo client flow.

use ic_broker::{BrokerConfig, ConfigError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Payload written by the demo when `IC_DEMO_MESSAGE` is unset.
pub const DEFAULT_DEMO_MESSAGE: &str = "Hello, world!";

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Broker session configuration.
    pub broker: BrokerConfig,
    /// Payload the demo writes.
    pub demo_message: String,
    /// Length of the demo's deferred read.
    pub read_length: usize,
    /// Keep running after the demo until Ctrl+C.
    pub linger: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            demo_message: DEFAULT_DEMO_MESSAGE.to_string(),
            read_length: ic_broker::domain::MAX_WRITE_LENGTH,
            linger: false,
        }
    }
}

impl NodeConfig {
    /// Load configuration from the environment.
    ///
    /// - broker settings: see [`BrokerConfig::from_env`]
    /// - `IC_DEMO_MESSAGE`: payload to write
    /// - `IC_DEMO_READ_LENGTH`: length of the deferred read
    /// - `IC_LINGER`: keep running after the demo
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            broker: BrokerConfig::from_env()?,
            ..Self::default()
        };

        if let Ok(message) = std::env::var("IC_DEMO_MESSAGE") {
            config.demo_message = message;
        }
        if let Ok(length) = std::env::var("IC_DEMO_READ_LENGTH") {
            match length.parse() {
                Ok(n) => config.read_length = n,
                Err(_) => warn!("IC_DEMO_READ_LENGTH must be a byte count, got '{}'", length),
            }
        }
        if let Ok(flag) = std::env::var("IC_LINGER") {
            config.linger = matches!(flag.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        Ok(config)
    }
}
