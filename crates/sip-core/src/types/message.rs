//! SIP request and response envelopes
//!
//! [`Request`] and [`Response`] are the units the dispatcher clones and the
//! application-server layer forks and consolidates. [`Message`] unifies the
//! two for paths that carry either (the worker queue, the transport seams).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::header::{Header, HeaderAccess};
use crate::types::method::Method;
use crate::types::status::StatusCode;
use crate::types::uri::Uri;

/// A SIP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            method,
            uri,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// True if this is an ACK; ACKs never receive responses, which matters
    /// to the dispatcher's failure barrier.
    pub fn is_ack(&self) -> bool {
        self.method == Method::Ack
    }
}

impl HeaderAccess for Request {
    fn raw_headers(&self) -> &[Header] {
        &self.headers
    }
    fn raw_headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// A SIP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: StatusCode,
    /// Reason phrase; `None` renders the canonical phrase for the code.
    pub reason: Option<String>,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Response {
            status,
            reason: None,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// The reason phrase that would appear on the status line.
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }
}

impl HeaderAccess for Response {
    fn raw_headers(&self) -> &[Header] {
        &self.headers
    }
    fn raw_headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// Either a request or a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(req) => Some(req),
            Message::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(rsp) => Some(rsp),
            Message::Request(_) => None,
        }
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Message::Request(req)
    }
}

impl From<Response> for Message {
    fn from(rsp: Response) -> Self {
        Message::Response(rsp)
    }
}

impl HeaderAccess for Message {
    fn raw_headers(&self) -> &[Header] {
        match self {
            Message::Request(req) => req.raw_headers(),
            Message::Response(rsp) => rsp.raw_headers(),
        }
    }

    fn raw_headers_mut(&mut self) -> &mut Vec<Header> {
        match self {
            Message::Request(req) => req.raw_headers_mut(),
            Message::Response(rsp) => rsp.raw_headers_mut(),
        }
    }
}
