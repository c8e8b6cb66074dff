//! Common error types for uartgate.
//!
//! This module provides a centralized Error enum using thiserror, with
//! conversions from the underlying error types used throughout the crate.
//! Exchange failures have their own small enum because callers branch on
//! them (not connected vs. link fault) rather than just reporting them.

use thiserror::Error;

/// Main error type for uartgate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Enumeration returned no serial ports at all
    #[error("No serial ports found")]
    NoPortsFound,

    /// Ports exist but none of them could be opened
    #[error("No reachable serial port")]
    NoReachablePort,

    /// Opening a specific port failed
    #[error("Failed to open {port}: {cause}")]
    OpenFailed { port: String, cause: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// API client errors
    #[error("API error: {0}")]
    Api(String),
}

impl Error {
    /// Creates an open failure for `port` from any displayable cause.
    pub fn open_failed(port: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OpenFailed {
            port: port.into(),
            cause: cause.to_string(),
        }
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single command/response exchange.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// No connection is open; nothing was written.
    #[error("Not connected")]
    NotConnected,

    /// The link failed while writing or reading.
    #[error("Link I/O error: {0}")]
    Io(#[from] std::io::Error),
}
