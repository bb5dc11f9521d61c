//! Error types for trellis-appserver-core

use thiserror::Error;

/// Result type alias for application-server operations
pub type Result<T> = std::result::Result<T, AppServerError>;

/// Errors surfaced by the application-server layer
#[derive(Error, Debug)]
pub enum AppServerError {
    /// The transport seam failed to carry a request, response or CANCEL.
    #[error("transport send failed: {0}")]
    Transport(String),
}
