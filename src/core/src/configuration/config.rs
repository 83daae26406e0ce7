use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::types::{CaptureConfig, ServerConfig, StorageBackend};
use crate::error_handling::types::ConfigError;

/// Command line of the `pagetrace` binary.
///
/// Flags override the matching values of the configuration file.
#[derive(Parser, Debug, Clone)]
#[command(name = "pagetrace")]
#[command(version)]
#[command(about = "Page interaction capture and per-page session aggregation")]
pub struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, env = "PAGETRACE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port of the aggregation server
    #[arg(long, env = "PAGETRACE_PORT")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Run the aggregation HTTP server
    Serve,
    /// Capture one page view from interaction lines on stdin
    Capture {
        /// Path of the page being viewed, e.g. `/shop`
        #[arg(long)]
        page: String,
    },
}

/// Runtime configuration, one table per side of the pipeline.
///
/// # Examples
///
/// ```
/// use pagetrace::configuration::config::Config;
///
/// let config = Config::from_toml_str("[server]\nport = 8080\n").unwrap();
/// assert_eq!(config.server.port, 8080);
/// assert_eq!(config.capture.throttle_interval_ms, 5000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
}

impl Config {
    /// Reads and validates a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// File (or defaults) first, then command line overrides.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => {
                info!("No configuration file given, using defaults");
                Self::default()
            }
        };
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind_address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::BadIPFormatting(self.server.bind_address.clone()))?;
        if self.server.port == 0 {
            return Err(ConfigError::BadPortsRange(
                "server.port must be within 1..=65535".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::NotInRange(
                "server.max_body_bytes must be > 0".to_string(),
            ));
        }
        if self.server.storage_backend == StorageBackend::Sqlite
            && self.server.database_path.as_os_str().is_empty()
        {
            return Err(ConfigError::MissingValue("server.database_path".to_string()));
        }
        if self.capture.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingValue("capture.endpoint".to_string()));
        }
        if self.capture.flush_interval_ms == 0 {
            return Err(ConfigError::NotInRange(
                "capture.flush_interval_ms must be > 0".to_string(),
            ));
        }
        if self.capture.throttle_interval_ms == 0 {
            return Err(ConfigError::NotInRange(
                "capture.throttle_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self
            .server
            .bind_address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::BadIPFormatting(self.server.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.capture.flush_interval_ms)
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.capture.throttle_interval_ms)
    }
}
