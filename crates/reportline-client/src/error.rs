//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    /// Credential rejected (expired or invalid).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A coordinated read failed.
    #[error(transparent)]
    Coordinated(#[from] reportline_cache::Error),
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) | Error::Api { status: 404, .. } => true,
            Error::Coordinated(e) => e.producer_error::<Error>().is_some_and(Error::is_not_found),
            _ => false,
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Error::Auth(_) | Error::Api { status: 401, .. } => true,
            Error::Coordinated(e) => e.producer_error::<Error>().is_some_and(Error::is_auth_error),
            _ => false,
        }
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status >= 500,
            Error::Coordinated(e) => e
                .producer_error::<Error>()
                .is_some_and(Error::is_server_error),
            _ => false,
        }
    }

    /// Check if the request timed out before a response arrived.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Http(e) if e.is_timeout())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error body returned by the backend.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(alias = "error", alias = "detail")]
    pub message: String,
}
