//! Core error types shared across the Lattice framework.

use thiserror::Error;

/// Type-erased error returned by user-supplied handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Wraps any error produced inside a user-supplied handler.
///
/// Handler failures are always caught at the dispatch boundary that invoked
/// them; a `HandlerError` never crosses back into the platform SDK's event
/// loop. Orchestration errors (registration conflicts, dependency
/// violations) use their own enums and *do* propagate to the caller.
#[derive(Debug, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub BoxError);

impl HandlerError {
    /// Wraps an arbitrary handler error.
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self(source.into())
    }
}

/// Errors from the pluggable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (file-backed stores).
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be read or written as JSON.
    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for key-value store operations.
pub type StoreResult<T> = Result<T, StoreError>;
