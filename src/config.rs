//! Configuration management for Marketgate.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `MARKETGATE_`-prefixed environment variables using `__` to separate
//! nested keys (`MARKETGATE_RATE_LIMITING__MAX_REQUESTS=50`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{MarketgateError, Result};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "MARKETGATE";

/// Main configuration for the Marketgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission control configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Deployment environment name, reported by `/health`
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Origin allowed by CORS
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            environment: default_environment(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of a counting window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests admitted per identity per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// How often expired windows are swept, 0 disables the sweeper
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Identity shared by every caller whose address cannot be resolved
    #[serde(default = "default_unknown_identity")]
    pub unknown_identity: String,

    /// Take the identity from `X-Forwarded-For` (only behind a trusted proxy)
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            sweep_interval_secs: default_sweep_interval(),
            unknown_identity: default_unknown_identity(),
            trust_forwarded_for: false,
        }
    }
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_max_requests() -> u64 {
    100
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_unknown_identity() -> String {
    "unknown".to_string()
}

impl RateLimitingConfig {
    /// Interval of the background sweeper, `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MarketgateConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_source())
    }

    fn load_with(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: MarketgateConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: MarketgateConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot constrain.
    pub fn validate(&self) -> Result<()> {
        self.bind_socket_addr()?;

        if self.rate_limiting.window_secs == 0 {
            return Err(MarketgateError::Config(
                "rate_limiting.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.max_requests == 0 {
            return Err(MarketgateError::Config(
                "rate_limiting.max_requests must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.unknown_identity.is_empty() {
            return Err(MarketgateError::Config(
                "rate_limiting.unknown_identity must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The listener address as a socket address.
    pub fn bind_socket_addr(&self) -> Result<SocketAddr> {
        self.server.bind_addr.parse().map_err(|e| {
            MarketgateError::Config(format!(
                "invalid server.bind_addr '{}': {}",
                self.server.bind_addr, e
            ))
        })
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
