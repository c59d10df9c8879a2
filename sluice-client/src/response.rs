//! Responses and their bodies.

use std::fmt;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::{Body as _, Incoming};
use hyper::header::{AsHeaderName, HeaderMap};
use hyper::{StatusCode, Version};

use crate::connection::Connection;
use crate::error::Result;
use crate::pool::slots::SlotLease;

/// An HTTP response.
///
/// While the body is unread the response holds one of its pool's connection
/// slots. Reading the body to the end hands the connection back for reuse;
/// dropping it early frees the slot and closes the connection.
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Body,
    previous: Option<Box<Response>>,
}

impl Response {
    pub(crate) fn from_hyper(
        response: hyper::Response<Incoming>,
        lease: SlotLease,
        conn: Connection,
    ) -> Self {
        let (parts, incoming) = response.into_parts();
        let mut body = Body {
            inner: Inner::Streaming {
                incoming,
                reclaim: Some(Reclaim { lease, conn }),
            },
        };
        body.reclaim_if_finished();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
            previous: None,
        }
    }

    /// A response whose body is already in memory.
    pub fn buffered(status: StatusCode, headers: HeaderMap, content: Bytes) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers,
            body: Body::from_bytes(content),
            previous: None,
        }
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The HTTP version the server answered with.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The first value of header `name`, if present and valid UTF-8.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The body, for incremental reads.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Splits off the body.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        self.body.bytes().await
    }

    /// Reads the whole body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String> {
        self.body.text().await
    }

    /// The redirect response that led to this one, if any. Its body has
    /// already been consumed.
    pub fn previous(&self) -> Option<&Response> {
        self.previous.as_deref()
    }

    pub(crate) fn set_previous(&mut self, previous: Response) {
        self.previous = Some(Box::new(previous));
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("redirected", &self.previous.is_some())
            .finish_non_exhaustive()
    }
}

/// A response body.
pub struct Body {
    inner: Inner,
}

enum Inner {
    Streaming {
        incoming: Incoming,
        reclaim: Option<Reclaim>,
    },
    Buffered(Option<Bytes>),
}

/// The slot and connection a streaming body must give back.
struct Reclaim {
    lease: SlotLease,
    conn: Connection,
}

impl Body {
    /// A body over bytes already in memory.
    pub fn from_bytes(content: Bytes) -> Self {
        Self {
            inner: Inner::Buffered(Some(content)),
        }
    }

    /// Reads the next chunk of data. `Ok(None)` marks the end of the body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        let (incoming, reclaim) = match &mut self.inner {
            Inner::Buffered(content) => return Ok(content.take().filter(|c| !c.is_empty())),
            Inner::Streaming { incoming, reclaim } => (incoming, reclaim),
        };

        loop {
            match incoming.frame().await {
                None => {
                    if let Some(reclaim) = reclaim.take() {
                        reclaim.finish();
                    }
                    return Ok(None);
                }
                Some(Err(err)) => {
                    // A broken body leaves the connection unusable.
                    reclaim.take();
                    return Err(err.into());
                }
                Some(Ok(frame)) => {
                    // Trailers carry no data and are skipped.
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    if incoming.is_end_stream() {
                        if let Some(reclaim) = reclaim.take() {
                            reclaim.finish();
                        }
                    }
                    return Ok(Some(data));
                }
            }
        }
    }

    /// Reads the rest of the body into one buffer.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }

    /// Reads the rest of the body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Whether the body is known to have no more data.
    pub fn is_end_stream(&self) -> bool {
        match &self.inner {
            Inner::Buffered(content) => content.as_ref().map_or(true, Bytes::is_empty),
            Inner::Streaming { incoming, .. } => incoming.is_end_stream(),
        }
    }

    /// Gives the connection back right away when there is nothing to read,
    /// as for `204`, `304` or `Content-Length: 0` responses.
    fn reclaim_if_finished(&mut self) {
        if let Inner::Streaming { incoming, reclaim } = &mut self.inner {
            if incoming.is_end_stream() {
                if let Some(reclaim) = reclaim.take() {
                    reclaim.finish();
                }
            }
        }
    }
}

impl Reclaim {
    fn finish(self) {
        self.lease.release(self.conn);
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            Inner::Streaming { .. } => "streaming",
            Inner::Buffered(_) => "buffered",
        };
        f.debug_struct("Body").field("kind", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffered_body_yields_once() {
        let mut body = Body::from_bytes(Bytes::from_static(b"hello"));
        assert!(!body.is_end_stream());
        assert_eq!(body.chunk().await.unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(body.chunk().await.unwrap().is_none());
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn buffered_response_reads_as_text() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain".parse().unwrap());
        let resp = Response::buffered(StatusCode::OK, headers, Bytes::from_static(b"hi"));

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert!(resp.previous().is_none());
        assert_eq!(resp.text().await.unwrap(), "hi");
    }
}
