//! Outbound requests.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST,
    USER_AGENT,
};
use hyper::{Method, StatusCode, Uri};
use sluice_core::domain::priority::{self, Priority};

use crate::destination::Destination;
use crate::error::{Error, Result};

/// An HTTP request together with its scheduling priority.
///
/// The body is held in memory so the request can be replayed if a kept-alive
/// connection turns out to have been closed by the server.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    priority: Option<Priority>,
}

impl Request {
    /// Creates a body-less request. Fails if `url` does not parse.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let uri = url.parse::<Uri>().map_err(|err| Error::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self::from_uri(method, uri))
    }

    /// Creates a body-less request for an already parsed URI.
    pub fn from_uri(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            priority: None,
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url)
    }

    /// Sets the scheduling priority. Lower values are served first.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Adds a header, keeping any existing values for the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::try_from(name).map_err(hyper::http::Error::from)?;
        let value = HeaderValue::try_from(value).map_err(hyper::http::Error::from)?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Sets the body and its `Content-Type`.
    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Result<Self> {
        let value = HeaderValue::try_from(content_type).map_err(hyper::http::Error::from)?;
        self.headers.insert(CONTENT_TYPE, value);
        self.body = body.into();
        Ok(self)
    }

    /// The method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The priority set on this request, if any.
    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// The priority the scheduler uses for this request.
    pub fn effective_priority(&self) -> Priority {
        priority::effective(self.priority)
    }

    /// The destination this request is sent to. Fails for relative URIs and
    /// schemes other than `http`.
    pub fn destination(&self) -> Result<Destination> {
        Destination::from_uri(&self.uri)
    }

    /// The request to send after a `status` redirect to `location`.
    ///
    /// `307` and `308` replay the method and body. Other redirects turn the
    /// request into a body-less `GET`, except that `HEAD` stays `HEAD`.
    /// Credentials are dropped when the destination changes.
    pub(crate) fn redirected(mut self, status: StatusCode, location: Uri) -> Self {
        let keep_method = matches!(
            status,
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
        ) || self.method == Method::HEAD;
        if !keep_method {
            self.method = Method::GET;
            self.body = Bytes::new();
            self.headers.remove(CONTENT_TYPE);
            self.headers.remove(CONTENT_LENGTH);
        }

        if self.uri.authority() != location.authority() {
            self.headers.remove(AUTHORIZATION);
            self.headers.remove(COOKIE);
        }
        self.headers.remove(HOST);
        self.uri = location;
        self
    }

    /// Builds the origin-form hyper request sent on the wire.
    pub(crate) fn to_hyper(&self, user_agent: &str) -> Result<hyper::Request<Full<Bytes>>> {
        let path = self
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str());

        let mut builder = hyper::Request::builder()
            .method(self.method.clone())
            .uri(path);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
            if !headers.contains_key(HOST) {
                if let Some(authority) = self.uri.authority() {
                    headers.insert(HOST, HeaderValue::from_str(authority.as_str())?);
                }
            }
            if !headers.contains_key(USER_AGENT) {
                headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
            }
        }
        Ok(builder.body(Full::new(self.body.clone()))?)
    }
}
