//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Listen address when neither PORT nor SERVER_ADDR is set
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory holding the browser client bundle
    pub static_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // PORT takes precedence, then SERVER_ADDR
        let server_addr = match lookup("PORT") {
            Some(port) => {
                let port: u16 = port
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
            None => {
                let addr = lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
                addr.parse()
                    .map_err(|_| ConfigError::InvalidAddress(addr.clone()))?
            }
        };

        Ok(Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),

    #[error("Invalid server address format: {0}")]
    InvalidAddress(String),
}
