//! # Trellis SIP Core
//!
//! The parsed-message surface shared by every trellis crate. The actual SIP
//! parser and the transport layer live outside this workspace; what arrives
//! here is the structure a parser would have produced: a request line or
//! status line, a typed header list, and an opaque body.
//!
//! The types in this crate are deliberately deep-`Clone`: the dispatcher
//! clones every inbound message off the receive buffer, and application
//! servers clone requests again when they need to mutate individual forks
//! independently.
//!
//! ## Organization
//!
//! - [`types`] - `Method`, `StatusCode`, `Uri`, the header model, and the
//!   `Request`/`Response`/`Message` structures
//! - [`builder`] - builders for requests and responses, including
//!   [`builder::response_for`], which derives a response from a request per
//!   RFC 3261 Section 8.2.6.2

pub mod builder;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::header::{Header, HeaderAccess, HeaderName};
pub use types::message::{Message, Request, Response};
pub use types::method::Method;
pub use types::status::StatusCode;
pub use types::uri::{Scheme, Uri};

/// Commonly used imports for working with SIP messages.
pub mod prelude {
    pub use crate::builder::{response_for, RequestBuilder, ResponseBuilder};
    pub use crate::types::header::{Header, HeaderAccess, HeaderName};
    pub use crate::types::message::{Message, Request, Response};
    pub use crate::types::method::Method;
    pub use crate::types::status::StatusCode;
    pub use crate::types::uri::{Scheme, Uri};
    pub use crate::{Error, Result};
}
