//! Error types for the Marketgate service.

use thiserror::Error;

/// Main error type for Marketgate operations.
#[derive(Error, Debug)]
pub enum MarketgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (listener bind, serving)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for MarketgateError {
    fn from(err: config::ConfigError) -> Self {
        MarketgateError::Config(err.to_string())
    }
}

/// Result type alias for Marketgate operations.
pub type Result<T> = std::result::Result<T, MarketgateError>;
