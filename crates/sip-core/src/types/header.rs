//! SIP header model
//!
//! Headers are kept as a flat, order-preserving list of name/value pairs,
//! which is what the registration serializer and the proxy paths need. The
//! [`HeaderAccess`] trait layers typed accessors over that list for the
//! handful of headers the core actually interprets: Call-ID, CSeq, the
//! From/To tags, Expires, and Path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::method::Method;

/// A SIP header field name.
///
/// Comparison is by canonical form; parsing accepts any case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderName {
    Via,
    From,
    To,
    CallId,
    CSeq,
    Contact,
    Expires,
    MaxForwards,
    ContentLength,
    Route,
    RecordRoute,
    Path,
    RetryAfter,
    /// Any header the core does not interpret, stored by its literal name.
    Other(String),
}

impl HeaderName {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Via => "Via",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::Contact => "Contact",
            HeaderName::Expires => "Expires",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::Route => "Route",
            HeaderName::RecordRoute => "Record-Route",
            HeaderName::Path => "Path",
            HeaderName::RetryAfter => "Retry-After",
            HeaderName::Other(name) => name,
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "via" | "v" => HeaderName::Via,
            "from" | "f" => HeaderName::From,
            "to" | "t" => HeaderName::To,
            "call-id" | "i" => HeaderName::CallId,
            "cseq" => HeaderName::CSeq,
            "contact" | "m" => HeaderName::Contact,
            "expires" => HeaderName::Expires,
            "max-forwards" => HeaderName::MaxForwards,
            "content-length" | "l" => HeaderName::ContentLength,
            "route" => HeaderName::Route,
            "record-route" => HeaderName::RecordRoute,
            "path" => HeaderName::Path,
            "retry-after" => HeaderName::RetryAfter,
            _ => HeaderName::Other(s.to_string()),
        })
    }
}

/// A single header field: name plus its unparsed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: HeaderName,
    pub value: String,
}

impl Header {
    pub fn new(name: HeaderName, value: impl Into<String>) -> Self {
        Header {
            name,
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Extracts the `tag` parameter from a From/To header value.
fn tag_param(value: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (name, tag) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("tag") {
            Some(tag.trim().to_string())
        } else {
            None
        }
    })
}

/// Typed access to the headers the core interprets.
///
/// Implemented by [`Request`](crate::types::message::Request),
/// [`Response`](crate::types::message::Response), and
/// [`Message`](crate::types::message::Message).
pub trait HeaderAccess {
    /// All headers, in wire order.
    fn raw_headers(&self) -> &[Header];

    /// Mutable access to the header list.
    fn raw_headers_mut(&mut self) -> &mut Vec<Header>;

    /// The first header with the given name.
    fn header(&self, name: &HeaderName) -> Option<&Header> {
        self.raw_headers().iter().find(|h| &h.name == name)
    }

    /// Every value carried under the given name, in order.
    fn header_values<'a>(&'a self, name: &'a HeaderName) -> Vec<&'a str> {
        self.raw_headers()
            .iter()
            .filter(|h| &h.name == name)
            .map(|h| h.value.as_str())
            .collect()
    }

    /// Appends a header.
    fn push_header(&mut self, header: Header) {
        self.raw_headers_mut().push(header);
    }

    /// Replaces every header of `name` with a single value.
    fn set_header(&mut self, name: HeaderName, value: impl Into<String>) {
        self.raw_headers_mut().retain(|h| h.name != name);
        self.raw_headers_mut().push(Header::new(name, value));
    }

    /// The Call-ID value.
    fn call_id(&self) -> Option<&str> {
        self.header(&HeaderName::CallId).map(|h| h.value.as_str())
    }

    /// The CSeq sequence number and method.
    fn cseq(&self) -> Option<(u32, Method)> {
        let value = &self.header(&HeaderName::CSeq)?.value;
        let (seq, method) = value.trim().split_once(char::is_whitespace)?;
        let seq = seq.parse().ok()?;
        let method = method.trim().parse().ok()?;
        Some((seq, method))
    }

    /// The tag parameter on the From header, if present.
    fn from_tag(&self) -> Option<String> {
        tag_param(&self.header(&HeaderName::From)?.value)
    }

    /// The tag parameter on the To header, if present.
    fn to_tag(&self) -> Option<String> {
        tag_param(&self.header(&HeaderName::To)?.value)
    }

    /// The Expires header as seconds.
    fn expires(&self) -> Option<u32> {
        self.header(&HeaderName::Expires)?.value.trim().parse().ok()
    }

    /// All Path header values in order (RFC 3327).
    fn path_values(&self) -> Vec<String> {
        self.header_values(&HeaderName::Path)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
