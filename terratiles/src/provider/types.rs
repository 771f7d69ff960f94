//! Provider error types.

use thiserror::Error;

/// Errors returned by an HTTP client for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The request could not be completed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The HTTP client could not be built from the transport settings.
    #[error("Invalid transport configuration: {0}")]
    InvalidTransport(String),
}

impl ProviderError {
    /// HTTP status code, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
