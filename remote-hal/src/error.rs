//! Common error types for remote-hal.
//!
//! This module provides a centralized Error enum using thiserror,
//! with conversions from underlying error types used throughout the crate.

use thiserror::Error;

/// Main error type for remote-hal operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport misuse or unsupported transport operations
    #[error("Transport error: {0}")]
    Transport(String),

    /// Handshake failures that are not retried
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// A bounded retry policy ran out before the device identified itself
    #[error("No device identified after {attempts} attempts")]
    HandshakeExhausted { attempts: u32 },

    /// Remote peripheral call errors
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// A reply from the remote controller did not arrive in time
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
