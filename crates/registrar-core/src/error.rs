//! Error types for trellis-registrar-core

use thiserror::Error;

/// Result type alias for registrar operations
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Main error type for registrar operations
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// The record changed under a compare-and-swap write. Transient: re-read
    /// and retry.
    #[error("registration record changed under compare-and-swap write")]
    Contention,

    /// The backing store failed. Transient from the caller's point of view.
    #[error("data store failure: {0}")]
    Store(String),

    /// A stored record could not be deserialized.
    #[error("corrupt registration record: {0}")]
    Corrupt(String),

    /// A retry budget was exhausted without a successful write.
    #[error("gave up after {0} contended write attempts")]
    RetriesExhausted(usize),
}

impl RegistrarError {
    /// True for failures a caller should retry rather than surface.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistrarError::Contention | RegistrarError::Store(_))
    }
}
