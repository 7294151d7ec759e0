//! Configuration surface (§6): loaded once at startup from a TOML file and
//! swapped atomically as a whole whenever the controller replaces the
//! bounding box.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("api_key must not be empty")]
    EmptyApiKey,
    #[error("bounding_box.south ({south}) must be less than bounding_box.north ({north})")]
    InvertedBoundingBox { south: f64, north: f64 },
    #[error("at least one of network.enable_stream or network.enable_datagram must be true")]
    NoSinkEnabled,
    #[error("port {0} is out of the valid 1..65535 range")]
    InvalidPort(u32),
    #[error("logging.statistics_interval_seconds must be positive")]
    NonPositiveStatisticsInterval,
    #[error("stream_url {url:?} is not a valid URL: {source}")]
    InvalidStreamUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// A latitude/longitude rectangle. `west > east` represents a rectangle
/// that crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// The wire shape the upstream subscription frame expects:
    /// `[[south, west], [north, east]]`. The in-memory field order above is
    /// implementation freedom; this serialized order is the contract.
    pub fn to_subscription_array(self) -> [[f64; 2]; 2] {
        [[self.south, self.west], [self.north, self.east]]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatagramConfig {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub enable_stream: bool,
    pub enable_datagram: bool,
    pub stream: StreamServerConfig,
    pub datagram: DatagramConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_statistics_interval")]
    pub statistics_interval_seconds: u64,
}

fn default_statistics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub api_key: String,
    pub stream_url: String,
    pub bounding_box: BoundingBox,
    pub network: NetworkConfig,
    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        statistics_interval_seconds: default_statistics_interval(),
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: RelayConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        url::Url::parse(&self.stream_url).map_err(|source| ConfigError::InvalidStreamUrl {
            url: self.stream_url.clone(),
            source,
        })?;
        if self.bounding_box.south >= self.bounding_box.north {
            return Err(ConfigError::InvertedBoundingBox {
                south: self.bounding_box.south,
                north: self.bounding_box.north,
            });
        }
        if !self.network.enable_stream && !self.network.enable_datagram {
            return Err(ConfigError::NoSinkEnabled);
        }
        for port in [self.network.stream.port, self.network.datagram.port] {
            if port == 0 {
                return Err(ConfigError::InvalidPort(port as u32));
            }
        }
        if self.logging.statistics_interval_seconds == 0 {
            return Err(ConfigError::NonPositiveStatisticsInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        RelayConfig {
            api_key: "key".into(),
            stream_url: "wss://example.invalid/stream".into(),
            bounding_box: BoundingBox { north: 49.0, south: 48.0, east: -122.0, west: -123.0 },
            network: NetworkConfig {
                enable_stream: true,
                enable_datagram: true,
                stream: StreamServerConfig {
                    host: "0.0.0.0".parse().unwrap(),
                    port: 2000,
                    max_connections: 32,
                },
                datagram: DatagramConfig { host: "255.255.255.255".parse().unwrap(), port: 2001 },
            },
            logging: LoggingConfig { statistics_interval_seconds: 30 },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut config = valid();
        config.api_key = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyApiKey)));
    }

    #[test]
    fn inverted_bounding_box_is_rejected() {
        let mut config = valid();
        config.bounding_box.south = 50.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvertedBoundingBox { .. })));
    }

    #[test]
    fn both_sinks_disabled_is_rejected() {
        let mut config = valid();
        config.network.enable_stream = false;
        config.network.enable_datagram = false;
        assert!(matches!(config.validate(), Err(ConfigError::NoSinkEnabled)));
    }

    #[test]
    fn malformed_stream_url_is_rejected() {
        let mut config = valid();
        config.stream_url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidStreamUrl { .. })));
    }

    #[test]
    fn bounding_box_serializes_to_south_west_north_east() {
        let bbox = BoundingBox { north: 49.0, south: 48.0, east: -122.0, west: -123.0 };
        assert_eq!(bbox.to_subscription_array(), [[48.0, -123.0], [49.0, -122.0]]);
    }
}
