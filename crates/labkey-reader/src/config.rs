//! Reader service configuration.
//!
//! Every field has a default, so an empty TOML table is a valid
//! configuration:
//!
//! ```toml
//! port = "/dev/ttyACM0"
//! baud_rate = 9600
//! auto_connect = true
//! max_reconnect_attempts = 5
//! reconnect_delay_ms = 5000
//! dialect = "json"
//! ```

use std::path::Path;
use std::time::Duration;

use labkey_core::constants::*;
use labkey_core::ReconnectPolicy;
use labkey_protocol::Dialect;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for labkey_core::Error {
    fn from(error: ConfigError) -> Self {
        labkey_core::Error::Config(error.to_string())
    }
}

/// Settings of the card reader service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    /// Serial port to open at startup. When unset, an Arduino is discovered.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Connect at startup and reconnect after the connection drops.
    pub auto_connect: bool,
    pub max_reconnect_attempts: u32,
    /// Base delay of the linear reconnect backoff.
    pub reconnect_delay_ms: u64,
    pub status_interval_ms: u64,
    pub handshake_delay_ms: u64,
    pub recent_card_window_ms: u64,
    pub read_timeout_ms: u64,
    /// Green LED after a card read, red after a reader error. `0` disables.
    pub led_flash_ms: u64,
    pub dialect: Dialect,
    /// Run without serial hardware even when it is available.
    pub force_mock: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            auto_connect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
            handshake_delay_ms: DEFAULT_HANDSHAKE_DELAY_MS,
            recent_card_window_ms: RECENT_CARD_WINDOW_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            led_flash_ms: DEFAULT_LED_FLASH_MS,
            dialect: Dialect::default(),
            force_mock: false,
        }
    }
}

impl ReaderConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check values that would make the service misbehave.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero baud rate, a zero status
    /// interval, or an empty port name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.status_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "status_interval_ms must be positive".into(),
            ));
        }
        if self.port.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid("port must not be empty".into()));
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_reconnect_attempts,
            Duration::from_millis(self.reconnect_delay_ms),
        )
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn handshake_delay(&self) -> Duration {
        Duration::from_millis(self.handshake_delay_ms)
    }

    pub fn recent_card_window(&self) -> Duration {
        Duration::from_millis(self.recent_card_window_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// `None` when LED feedback is disabled.
    pub fn led_flash(&self) -> Option<Duration> {
        (self.led_flash_ms > 0).then(|| Duration::from_millis(self.led_flash_ms))
    }
}
