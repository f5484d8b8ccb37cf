//! Error types for gopro-usb

use thiserror::Error;

/// Main error type for gopro-usb operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration directory not found")]
    NoConfigDir,

    #[error("Invalid serial token: {0}")]
    InvalidSerial(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using gopro-usb's Error
pub type Result<T> = std::result::Result<T, Error>;
