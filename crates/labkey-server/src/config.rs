//! Bridge configuration file.
//!
//! ```toml
//! bind = "127.0.0.1:3001"
//!
//! [reader]
//! port = "/dev/ttyACM0"
//! baud_rate = 9600
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use labkey_reader::{ConfigError, ReaderConfig};
use serde::{Deserialize, Serialize};

/// Default HTTP port of the bridge.
pub const DEFAULT_HTTP_PORT: u16 = 3001;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,
    pub reader: ReaderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_HTTP_PORT)),
            reader: ReaderConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.reader.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labkey_protocol::Dialect;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind.port(), DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_reader_table() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind = "0.0.0.0:8080"

            [reader]
            port = "COM3"
            dialect = "text"
            force_mock = true
            "#,
        )
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.reader.port.as_deref(), Some("COM3"));
        assert_eq!(config.reader.dialect, Dialect::Text);
        assert!(config.reader.force_mock);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            ServerConfig::from_toml_str("bind = \"not an address\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("[reader]\nbaud_rate = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(ServerConfig::from_toml_str("unknown = 1").is_err());
    }
}
