//! Broker configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use ic_broker::domain::BrokerConfigBuilder;
//!
//! let config = BrokerConfigBuilder::new()
//!     .tick_interval_ms(500)
//!     .message_log_capacity(64)
//!     .build()?;
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Period of the completion tick.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 2000;
/// Largest accepted write payload.
pub const MAX_WRITE_LENGTH: usize = 512;
/// Number of entries kept in the message log.
pub const NUM_MESSAGES: usize = 2000;
/// Bytes kept per message log entry.
pub const MESSAGE_SIZE: usize = 512;

/// Per-session broker configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Period of the tick that completes the deferred read (ms)
    pub tick_interval_ms: u64,
    /// Largest write payload accepted; also the cap on one notify transfer
    pub max_write_length: usize,
    /// Message log capacity (entries)
    pub message_log_capacity: usize,
    /// Bytes kept per message log entry
    pub message_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_write_length: MAX_WRITE_LENGTH,
            message_log_capacity: NUM_MESSAGES,
            message_size: MESSAGE_SIZE,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.max_write_length == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "max_write_length",
            });
        }
        if self.message_log_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "message_log_capacity",
            });
        }
        if self.message_size == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "message_size",
            });
        }
        if self.max_write_length > self.message_size {
            return Err(ConfigError::WriteLengthExceedsMessageSize {
                max_write_length: self.max_write_length,
                message_size: self.message_size,
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Load from environment variables, falling back to defaults.
    ///
    /// - `IC_TICK_INTERVAL_MS`
    /// - `IC_MAX_WRITE_LENGTH`
    /// - `IC_MESSAGE_LOG_CAPACITY`
    ///
    /// Unparseable values are logged and ignored. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = env_parse::<u64>("IC_TICK_INTERVAL_MS") {
            config.tick_interval_ms = value;
        }
        if let Some(value) = env_parse::<usize>("IC_MAX_WRITE_LENGTH") {
            config.max_write_length = value;
        }
        if let Some(value) = env_parse::<usize>("IC_MESSAGE_LOG_CAPACITY") {
            config.message_log_capacity = value;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid {} value '{}', using default", key, raw);
            None
        }
    }
}

/// Builder for BrokerConfig with validation
#[derive(Default)]
pub struct BrokerConfigBuilder {
    tick_interval_ms: Option<u64>,
    max_write_length: Option<usize>,
    message_log_capacity: Option<usize>,
    message_size: Option<usize>,
}

impl BrokerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = Some(ms);
        self
    }

    pub fn max_write_length(mut self, len: usize) -> Self {
        self.max_write_length = Some(len);
        self
    }

    pub fn message_log_capacity(mut self, capacity: usize) -> Self {
        self.message_log_capacity = Some(capacity);
        self
    }

    pub fn message_size(mut self, size: usize) -> Self {
        self.message_size = Some(size);
        self
    }

    /// Build the configuration, applying defaults for unset fields.
    pub fn build(self) -> Result<BrokerConfig, ConfigError> {
        let defaults = BrokerConfig::default();
        let config = BrokerConfig {
            tick_interval_ms: self.tick_interval_ms.unwrap_or(defaults.tick_interval_ms),
            max_write_length: self.max_write_length.unwrap_or(defaults.max_write_length),
            message_log_capacity: self
                .message_log_capacity
                .unwrap_or(defaults.message_log_capacity),
            message_size: self.message_size.unwrap_or(defaults.message_size),
        };
        config.validate()?;
        Ok(config)
    }
}
