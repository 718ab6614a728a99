//! Error types for coordinated requests.

use std::sync::Arc;

/// Error type shared by every awaiter of a coordinated request.
///
/// Cloneable so that a single failed producer call can be handed to all
/// callers that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The producer returned an error.
    #[error("request failed: {0}")]
    Producer(Arc<dyn std::error::Error + Send + Sync>),

    /// The producer task ended without a result (panicked or was cancelled).
    #[error("request aborted: {0}")]
    Aborted(String),
}

impl Error {
    pub(crate) fn producer<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Producer(Arc::new(err))
    }

    /// Downcast the producer's original error.
    pub fn producer_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::Producer(inner) => inner.downcast_ref::<E>(),
            Error::Aborted(_) => None,
        }
    }
}

/// Result type for coordinated requests.
pub type Result<T> = std::result::Result<T, Error>;
