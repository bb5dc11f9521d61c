//! SIP request methods
//!
//! As defined in RFC 3261 Section 7.1, plus the extension methods the core
//! is prepared to route. Unrecognized tokens are preserved verbatim in
//! [`Method::Extension`] so they can be forwarded rather than rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A SIP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// INVITE - initiate a session
    Invite,
    /// ACK - acknowledge a final response to an INVITE
    Ack,
    /// BYE - terminate a session
    Bye,
    /// CANCEL - cancel a pending request
    Cancel,
    /// REGISTER - bind a contact to an address of record
    Register,
    /// OPTIONS - query capabilities
    Options,
    /// SUBSCRIBE - request event notification (RFC 6665)
    Subscribe,
    /// NOTIFY - deliver an event notification (RFC 6665)
    Notify,
    /// MESSAGE - instant message (RFC 3428)
    Message,
    /// UPDATE - modify session state (RFC 3311)
    Update,
    /// INFO - mid-session information (RFC 6086)
    Info,
    /// Any extension method, stored as its literal token
    Extension(String),
}

impl Method {
    /// The canonical token for this method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Register => "REGISTER",
            Method::Options => "OPTIONS",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Message => "MESSAGE",
            Method::Update => "UPDATE",
            Method::Info => "INFO",
            Method::Extension(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INVITE" => Ok(Method::Invite),
            "ACK" => Ok(Method::Ack),
            "BYE" => Ok(Method::Bye),
            "CANCEL" => Ok(Method::Cancel),
            "REGISTER" => Ok(Method::Register),
            "OPTIONS" => Ok(Method::Options),
            "SUBSCRIBE" => Ok(Method::Subscribe),
            "NOTIFY" => Ok(Method::Notify),
            "MESSAGE" => Ok(Method::Message),
            "UPDATE" => Ok(Method::Update),
            "INFO" => Ok(Method::Info),
            token if !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(Method::Extension(token.to_string()))
            }
            other => Err(Error::InvalidMethod(other.to_string())),
        }
    }
}
