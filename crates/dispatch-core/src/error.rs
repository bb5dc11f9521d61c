//! Error types for trellis-dispatch-core

use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors surfaced by the dispatch pipeline
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Downstream processing reported a failure (as opposed to panicking).
    #[error("downstream processing failed: {0}")]
    Processing(String),

    /// A stateless send back to the origin failed.
    #[error("transport send failed: {0}")]
    Transport(String),
}
