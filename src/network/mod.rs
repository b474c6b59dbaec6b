//! Network module - TCP transport between an application and its peers
//!
//! Provides:
//! - Server for accepting incoming connections
//! - Client for connecting to servers
//! - Connection state machine and message routing

mod client;
mod connection;
mod server;

pub use client::*;
pub use connection::*;
pub use server::*;

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of a client on a server. Unique within one server instance.
pub type ClientId = u32;

/// A networking port.
pub type Port = u16;

/// Default port for transport communication.
pub const DEFAULT_PORT: Port = 52000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration for network operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Port to listen on or connect to
    #[serde(default = "default_port")]
    pub port: Port,
    /// Interface to bind to (default: all)
    pub bind_address: Option<String>,
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_port() -> Port {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: None,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl NetworkConfig {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: NetworkConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: Port) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("could not resolve host: {}", host),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.connect_timeout_ms, 5000);
        assert!(config.bind_address.is_none());
    }

    #[test]
    fn save_and_load() {
        let config = NetworkConfig {
            port: 4242,
            bind_address: Some("127.0.0.1".to_string()),
            connect_timeout_ms: 250,
        };
        let file = tempfile::NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = NetworkConfig::load(file.path()).unwrap();
        assert_eq!(loaded.port, 4242);
        assert_eq!(loaded.bind_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(loaded.connect_timeout_ms, 250);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let loaded: NetworkConfig = toml::from_str("port = 9000\n").unwrap();
        assert_eq!(loaded.port, 9000);
        assert_eq!(loaded.connect_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn resolve_loopback() {
        let addr = resolve_host("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }
}
