//! SIP protocol types
//!
//! The subset of the RFC 3261 data model that the edge-node core routes on:
//! methods, status codes, URIs, headers, and the request/response envelopes.

pub mod header;
pub mod message;
pub mod method;
pub mod status;
pub mod uri;

pub use header::{Header, HeaderAccess, HeaderName};
pub use message::{Message, Request, Response};
pub use method::Method;
pub use status::StatusCode;
pub use uri::{Scheme, Uri};
