//! Errors surfaced by the client.

use std::io;
use std::time::Duration;

use hyper::StatusCode;

use crate::destination::Destination;

/// Errors produced while building, scheduling or executing a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The URL could not be parsed or has no host.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Only plain `http` is supported.
    #[error("bad scheme {0}")]
    UnsupportedScheme(String),

    /// A method, header or request line could not be built.
    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    /// Dialing the destination failed.
    #[error("failed to connect to {destination}: {source}")]
    Connect {
        /// Where we tried to connect.
        destination: Destination,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The HTTP exchange failed.
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    /// The redirect chain exceeded the hop limit.
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    /// A redirect response carried no usable `Location` header.
    #[error("{0} response missing Location header")]
    MissingLocation(StatusCode),

    /// The caller's wait exceeded the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The scheduler tasks are gone, usually because the runtime shut down.
    #[error("client scheduler shut down")]
    Shutdown,

    /// The client configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading configuration from disk failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<hyper::header::InvalidHeaderValue> for Error {
    fn from(err: hyper::header::InvalidHeaderValue) -> Self {
        Error::Request(err.into())
    }
}

/// Result alias using the client [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;
