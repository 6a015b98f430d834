//! Configuration management for the RAX FTP client
//!
//! Values come from an optional `config.toml` with environment overrides
//! prefixed `RAX_FTP_CLIENT` (for example `RAX_FTP_CLIENT_READ_TIMEOUT_SECS`).

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config";
const ENV_PREFIX: &str = "RAX_FTP_CLIENT";

/// Client configuration shared by the control and data channels
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Seconds to wait for a TCP connect; 0 blocks indefinitely
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Seconds to wait for a response line; 0 blocks indefinitely
    #[serde(default = "default_io_timeout")]
    pub read_timeout_secs: u64,

    /// Seconds to wait for a command write; 0 blocks indefinitely
    #[serde(default = "default_io_timeout")]
    pub write_timeout_secs: u64,

    /// Local address the active-mode listener binds to
    #[serde(default = "default_bind_address")]
    pub active_bind_address: String,

    /// Longest response line accepted from the server, CRLF included
    #[serde(default = "default_max_response_length")]
    pub max_response_length: usize,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_io_timeout() -> u64 {
    60
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_max_response_length() -> usize {
    8192
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_io_timeout(),
            write_timeout_secs: default_io_timeout(),
            active_bind_address: default_bind_address(),
            max_response_length: default_max_response_length(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from ./config.toml (if present) with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from the given file stem (if present) with environment overrides
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.max_response_length < 8 {
            return Err(config::ConfigError::Message(
                "max_response_length must be at least 8".into(),
            ));
        }

        if self.active_bind_address.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "active_bind_address cannot be empty".into(),
            ));
        }

        if self
            .active_bind_address
            .parse::<std::net::IpAddr>()
            .is_err()
        {
            return Err(config::ConfigError::Message(format!(
                "active_bind_address is not an IP address: {}",
                self.active_bind_address
            )));
        }

        Ok(())
    }

    /// Connect timeout, `None` meaning no limit
    pub fn connect_timeout(&self) -> Option<Duration> {
        as_timeout(self.connect_timeout_secs)
    }

    /// Read timeout, `None` meaning no limit
    pub fn read_timeout(&self) -> Option<Duration> {
        as_timeout(self.read_timeout_secs)
    }

    /// Write timeout, `None` meaning no limit
    pub fn write_timeout(&self) -> Option<Duration> {
        as_timeout(self.write_timeout_secs)
    }
}

fn as_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
