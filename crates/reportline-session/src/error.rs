//! Error types for the session layer.

use crate::liveness::CheckFailure;

/// Errors from local session storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to read or write the backing file.
    #[error("session storage I/O error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Stored data could not be (de)serialized.
    #[error("session storage serialization error: {0}")]
    Serialization(String),

    /// Storage is not usable at all.
    #[error("session storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors from decoding a session token.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Token does not have the `header.payload.signature` shape.
    #[error("malformed token")]
    Malformed,

    /// Payload segment is not valid base64url.
    #[error("invalid token encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Payload is not a valid claims object.
    #[error("invalid token claims: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Errors from a backend account-status check.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StatusError {
    /// The backend rejected the credential (expired or invalid).
    #[error("credential rejected")]
    Unauthorized,

    /// The check could not be completed.
    #[error("status check failed ({kind}): {message}")]
    Failed { kind: CheckFailure, message: String },
}

/// Errors from a server-side cleanup call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CleanupError {
    /// The backend rejected the credential.
    #[error("credential rejected")]
    Unauthorized,

    /// The call failed for any other reason.
    #[error("cleanup failed: {0}")]
    Failed(String),
}

/// Errors from starting a new session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The issued token could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The issued token is already past its expiry.
    #[error("session token already expired")]
    Expired,

    /// The session could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
}
