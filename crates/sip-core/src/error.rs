//! Error types for trellis-sip-core

use thiserror::Error;

/// Result type alias for SIP message operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing or interrogating SIP messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// URI could not be parsed
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// Unknown or malformed method token
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// Status code outside the 100-699 range
    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// A header value did not have the expected shape
    #[error("malformed {name} header: {value}")]
    MalformedHeader { name: String, value: String },

    /// A header required by the operation is absent
    #[error("missing {0} header")]
    MissingHeader(String),
}
