//! Destination addresses that pools are keyed by.

use std::fmt;
use std::str::FromStr;

use hyper::http::uri::{Authority, Scheme};
use hyper::Uri;

use crate::error::{Error, Result};

const DEFAULT_HTTP_PORT: u16 = 80;

/// A host and port that requests are sent to. One pool exists per destination.
///
/// Hosts are compared case-insensitively; they are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    /// Creates a destination for `host` and `port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Resolves the destination of an absolute `http` URI.
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let scheme = uri.scheme().ok_or_else(|| Error::InvalidUrl {
            url: uri.to_string(),
            reason: "missing scheme".into(),
        })?;
        if *scheme != Scheme::HTTP {
            return Err(Error::UnsupportedScheme(scheme.to_string()));
        }
        let host = uri.host().filter(|h| !h.is_empty()).ok_or_else(|| Error::InvalidUrl {
            url: uri.to_string(),
            reason: "missing host".into(),
        })?;
        Ok(Self::new(host, uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT)))
    }

    /// The lower-cased host, with brackets for IPv6 literals.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The host in the form socket address resolution expects.
    pub(crate) fn dial_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Destination {
    type Err = Error;

    /// Parses `host:port`, or a bare `host` meaning port 80.
    fn from_str(s: &str) -> Result<Self> {
        let authority = Authority::from_str(s).map_err(|err| Error::InvalidUrl {
            url: s.to_string(),
            reason: err.to_string(),
        })?;
        if authority.as_str().contains('@') {
            return Err(Error::InvalidUrl {
                url: s.to_string(),
                reason: "destinations carry no userinfo".into(),
            });
        }
        Ok(Self::new(
            authority.host(),
            authority.port_u16().unwrap_or(DEFAULT_HTTP_PORT),
        ))
    }
}
