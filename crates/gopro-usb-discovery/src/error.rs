//! Discovery error types

use thiserror::Error;

/// Errors that can occur while locating or binding to a camera
///
/// None of these cross the message channel; the bridge turns them into
/// `false`/`null` results.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No camera found: {0}")]
    NotFound(String),

    #[error("Discovery timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to bind to {interface}: {reason}")]
    BindFailure { interface: String, reason: String },

    #[error("Platform facility failed: {0}")]
    Platform(String),

    #[error("mDNS error: {0}")]
    Mdns(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoveryError {
    /// Create a bind failure error
    pub fn bind_failure(interface: impl Into<String>, reason: impl Into<String>) -> Self {
        DiscoveryError::BindFailure {
            interface: interface.into(),
            reason: reason.into(),
        }
    }
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
