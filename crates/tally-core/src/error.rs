//! Error types for tally-core

use thiserror::Error;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote store error (transient; retryable)
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Remote store rejected the request for this identity
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity failed required-field validation before transmission
    #[error("Invalid {kind} {id}: missing fields {missing:?}")]
    Validation {
        /// Entity kind (e.g. "game session")
        kind: &'static str,
        /// Entity id
        id: String,
        /// Names of the missing/invalid fields
        missing: Vec<&'static str>,
    },

    /// Ownership or linking conflict rejected at the mutation boundary
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is a permission error from the durable store.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
