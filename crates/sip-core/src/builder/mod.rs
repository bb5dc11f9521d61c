//! SIP message builders
//!
//! [`response_for`] derives a response from a request the way RFC 3261
//! Section 8.2.6.2 requires: Via, From, To, Call-ID and CSeq are copied
//! across and a zero Content-Length is stamped. It is what the core uses to
//! synthesize its own responses (408 on fork failure, 487 on cancel, 500
//! from the worker barrier).

use uuid::Uuid;

use crate::types::header::{Header, HeaderAccess, HeaderName};
use crate::types::message::{Request, Response};
use crate::types::method::Method;
use crate::types::status::StatusCode;
use crate::types::uri::Uri;

/// Builder for SIP requests.
///
/// Intended for tests and for the core's own synthesized requests (CANCEL
/// on a fork); real traffic arrives pre-parsed from the transport.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, uri: Uri) -> Self {
        RequestBuilder {
            request: Request::new(method, uri),
        }
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.request.push_header(Header::new(name, value));
        self
    }

    /// Adds a Via header with a freshly generated branch parameter.
    pub fn via(self, sent_by: &str) -> Self {
        let branch = generated_branch();
        self.header(
            HeaderName::Via,
            format!("SIP/2.0/UDP {sent_by};branch={branch}"),
        )
    }

    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

/// Builder for SIP responses.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        ResponseBuilder {
            response: Response::new(status),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.response.reason = Some(reason.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.response.push_header(Header::new(name, value));
        self
    }

    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.response.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}

/// Creates a response to `request` with the given status.
///
/// Copies the headers a UAS must mirror back (Via, From, To, Call-ID, CSeq)
/// and stamps `Content-Length: 0`.
pub fn response_for(request: &Request, status: StatusCode) -> Response {
    let mut response = Response::new(status);

    for name in [
        HeaderName::Via,
        HeaderName::From,
        HeaderName::To,
        HeaderName::CallId,
        HeaderName::CSeq,
    ] {
        for header in request.raw_headers().iter().filter(|h| h.name == name) {
            response.push_header(header.clone());
        }
    }

    response.push_header(Header::new(HeaderName::ContentLength, "0"));
    response
}

/// Creates a response with a To-tag added, establishing a dialog-capable
/// response. The tag is freshly generated if the request's To header did not
/// already carry one.
pub fn response_for_with_tag(request: &Request, status: StatusCode) -> Response {
    let mut response = response_for(request, status);

    if response.to_tag().is_none() {
        if let Some(to) = response.header(&HeaderName::To) {
            let tagged = format!("{};tag={}", to.value, generated_tag());
            response.set_header(HeaderName::To, tagged);
        }
    }

    response
}

/// A unique To-tag value.
pub fn generated_tag() -> String {
    format!("tag-{}", Uuid::new_v4().simple())
}

/// A unique Via branch parameter with the RFC 3261 magic cookie.
pub fn generated_branch() -> String {
    format!("z9hG4bK{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> Request {
        RequestBuilder::new(Method::Invite, "sip:bob@example.com".parse().unwrap())
            .via("client.example.com")
            .header(HeaderName::From, "<sip:alice@example.com>;tag=abc")
            .header(HeaderName::To, "<sip:bob@example.com>")
            .header(HeaderName::CallId, "call-1@client.example.com")
            .header(HeaderName::CSeq, "1 INVITE")
            .build()
    }

    #[test]
    fn response_mirrors_required_headers() {
        let request = invite();
        let response = response_for(&request, StatusCode::Ok);

        assert_eq!(response.status, StatusCode::Ok);
        assert_eq!(response.call_id(), Some("call-1@client.example.com"));
        assert_eq!(response.cseq(), Some((1, Method::Invite)));
        assert_eq!(response.from_tag().as_deref(), Some("abc"));
        assert!(response.header(&HeaderName::Via).is_some());
        assert_eq!(
            response.header(&HeaderName::ContentLength).map(|h| h.value.as_str()),
            Some("0")
        );
    }

    #[test]
    fn tagged_response_gains_to_tag_once() {
        let request = invite();
        let response = response_for_with_tag(&request, StatusCode::Ringing);
        let tag = response.to_tag().unwrap();
        assert!(tag.starts_with("tag-"));

        // A request whose To already carries a tag keeps it.
        let mut in_dialog = invite();
        in_dialog.set_header(HeaderName::To, "<sip:bob@example.com>;tag=existing");
        let response = response_for_with_tag(&in_dialog, StatusCode::Ok);
        assert_eq!(response.to_tag().as_deref(), Some("existing"));
    }

    #[test]
    fn branches_carry_magic_cookie() {
        assert!(generated_branch().starts_with("z9hG4bK"));
    }
}
