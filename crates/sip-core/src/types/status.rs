//! SIP response status codes
//!
//! Named variants cover every code the core itself emits or consolidates;
//! anything else is carried through as [`StatusCode::Other`]. The class
//! helpers back the best-response consolidation rules in the application
//! server layer (RFC 3261 Section 16.7).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A SIP response status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// 100 Trying
    Trying,
    /// 180 Ringing
    Ringing,
    /// 183 Session Progress
    SessionProgress,
    /// 200 OK
    Ok,
    /// 202 Accepted
    Accepted,
    /// 302 Moved Temporarily
    MovedTemporarily,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 408 Request Timeout
    RequestTimeout,
    /// 480 Temporarily Unavailable
    TemporarilyUnavailable,
    /// 486 Busy Here
    BusyHere,
    /// 487 Request Terminated
    RequestTerminated,
    /// 500 Server Internal Error
    InternalServerError,
    /// 503 Service Unavailable
    ServiceUnavailable,
    /// 504 Server Time-out
    ServerTimeout,
    /// 600 Busy Everywhere
    BusyEverywhere,
    /// 603 Decline
    Decline,
    /// Any other valid code (100-699)
    Other(u16),
}

impl StatusCode {
    /// Builds a status code from its numeric value.
    ///
    /// Codes outside 100-699 are rejected; unrecognized but valid codes are
    /// preserved as [`StatusCode::Other`].
    pub fn from_u16(code: u16) -> Result<StatusCode, Error> {
        if !(100..700).contains(&code) {
            return Err(Error::InvalidStatusCode(code));
        }
        Ok(match code {
            100 => StatusCode::Trying,
            180 => StatusCode::Ringing,
            183 => StatusCode::SessionProgress,
            200 => StatusCode::Ok,
            202 => StatusCode::Accepted,
            302 => StatusCode::MovedTemporarily,
            400 => StatusCode::BadRequest,
            404 => StatusCode::NotFound,
            408 => StatusCode::RequestTimeout,
            480 => StatusCode::TemporarilyUnavailable,
            486 => StatusCode::BusyHere,
            487 => StatusCode::RequestTerminated,
            500 => StatusCode::InternalServerError,
            503 => StatusCode::ServiceUnavailable,
            504 => StatusCode::ServerTimeout,
            600 => StatusCode::BusyEverywhere,
            603 => StatusCode::Decline,
            other => StatusCode::Other(other),
        })
    }

    /// The numeric value of this status code.
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Trying => 100,
            StatusCode::Ringing => 180,
            StatusCode::SessionProgress => 183,
            StatusCode::Ok => 200,
            StatusCode::Accepted => 202,
            StatusCode::MovedTemporarily => 302,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::RequestTimeout => 408,
            StatusCode::TemporarilyUnavailable => 480,
            StatusCode::BusyHere => 486,
            StatusCode::RequestTerminated => 487,
            StatusCode::InternalServerError => 500,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::ServerTimeout => 504,
            StatusCode::BusyEverywhere => 600,
            StatusCode::Decline => 603,
            StatusCode::Other(code) => *code,
        }
    }

    /// The response class (1 through 6).
    pub fn class(&self) -> u16 {
        self.as_u16() / 100
    }

    /// True for 1xx responses.
    pub fn is_provisional(&self) -> bool {
        self.class() == 1
    }

    /// True for 2xx responses.
    pub fn is_success(&self) -> bool {
        self.class() == 2
    }

    /// True for anything that completes a transaction (2xx-6xx).
    pub fn is_final(&self) -> bool {
        !self.is_provisional()
    }

    /// The canonical reason phrase for this code, or `"Unknown"` for codes
    /// without a registered phrase.
    pub fn reason_phrase(&self) -> &'static str {
        match self.as_u16() {
            100 => "Trying",
            180 => "Ringing",
            183 => "Session Progress",
            200 => "OK",
            202 => "Accepted",
            302 => "Moved Temporarily",
            400 => "Bad Request",
            404 => "Not Found",
            408 => "Request Timeout",
            480 => "Temporarily Unavailable",
            486 => "Busy Here",
            487 => "Request Terminated",
            500 => "Server Internal Error",
            503 => "Service Unavailable",
            504 => "Server Time-out",
            600 => "Busy Everywhere",
            603 => "Decline",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}
