//! Error types for the Prism transport.

use thiserror::Error;

/// Errors raised while talking to the management plane.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PrismError {
    /// Raised when the configured endpoint cannot be turned into a URL.
    #[error("invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// Endpoint as supplied by the operator.
        endpoint: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    /// Raised when the request never produced a response (connection
    /// refused, TLS failure, timeout).
    #[error("{method} {path} failed: {message}")]
    Transport {
        /// HTTP verb of the failed call.
        method: String,
        /// Request path of the failed call.
        path: String,
        /// Error text from the HTTP client.
        message: String,
    },
    /// Raised when a response body does not have the expected shape.
    #[error("unexpected response from {path}: {message}")]
    Decode {
        /// Request path whose response was rejected.
        path: String,
        /// Decoder error message.
        message: String,
    },
}

impl PrismError {
    /// Returns the human-readable message without the request prefix.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Transport { message, .. } | Self::Decode { message, .. } => message.clone(),
            Self::InvalidEndpoint { .. } | Self::Client(_) => self.to_string(),
        }
    }
}
