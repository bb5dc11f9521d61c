//! SIP URIs
//!
//! A compact URI representation sufficient for routing decisions: scheme,
//! user, host, port, and URI parameters. The full grammar of RFC 3261
//! Section 19.1 belongs to the external parser; this type carries what the
//! parser produced and can render it back on the wire.
//!
//! [`Uri::canonical`] produces the form used as the registration-store key
//! for an address of record: scheme, user, and host, with the port retained
//! only when explicit, and all parameters stripped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SIP or SIPS URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// URI parameters in appearance order; a parameter without `=` has a
    /// `None` value (e.g. `;lr`).
    pub params: Vec<(String, Option<String>)>,
}

impl Uri {
    /// Creates a `sip:` URI for the given host.
    pub fn sip(host: impl Into<String>) -> Self {
        Uri {
            scheme: Scheme::Sip,
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    /// Creates a `sips:` URI for the given host.
    pub fn sips(host: impl Into<String>) -> Self {
        Uri {
            scheme: Scheme::Sips,
            ..Uri::sip(host)
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Looks up a URI parameter by name (case-insensitive).
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    /// The canonical form used to key the registration store.
    ///
    /// Parameters are dropped so that transport or routing decoration does
    /// not split one address of record across multiple store records.
    pub fn canonical(&self) -> String {
        let mut out = format!("{}:", self.scheme);
        if let Some(user) = &self.user {
            out.push_str(user);
            out.push('@');
        }
        out.push_str(&self.host.to_ascii_lowercase());
        if let Some(port) = self.port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidUri(s.to_string());

        let (scheme, rest) = s.split_once(':').ok_or_else(invalid)?;
        let scheme = match scheme {
            s if s.eq_ignore_ascii_case("sip") => Scheme::Sip,
            s if s.eq_ignore_ascii_case("sips") => Scheme::Sips,
            _ => return Err(invalid()),
        };

        // Split off URI parameters first, then user@host:port.
        let mut segments = rest.split(';');
        let addr = segments.next().ok_or_else(invalid)?;
        let params = segments
            .map(|p| match p.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (p.to_string(), None),
            })
            .collect::<Vec<_>>();

        let (user, hostport) = match addr.rsplit_once('@') {
            Some((user, hostport)) if !user.is_empty() => (Some(user.to_string()), hostport),
            Some(_) => return Err(invalid()),
            None => (None, addr),
        };

        let (host, port) = match hostport.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                (host, Some(port))
            }
            None => (hostport, None),
        };

        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Uri {
            scheme,
            user,
            host: host.to_string(),
            port,
            params,
        })
    }
}
