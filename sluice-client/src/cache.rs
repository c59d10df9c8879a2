//! A storing [`Sender`] decorator.
//!
//! [`Cache`] keeps successful `GET` responses in a [`Store`] keyed by the
//! normalized request URL and answers `Cache-Control: only-if-cached`
//! requests from it without touching the network. It makes no freshness
//! decisions; any other request goes to the wrapped sender.

use std::future::Future;

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, VIA};
use hyper::{Method, StatusCode};
use sluice_core::{normalize_url, Info, MemoryStore, Store, Stored};

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;
use crate::sender::Sender;

const VIA_VALUE: &str = "1.1 sluice";

/// Wraps a sender and stores the `200` responses to its `GET` requests.
#[derive(Debug)]
pub struct Cache<S, St = MemoryStore> {
    next: S,
    store: St,
}

impl<S: Sender, St: Store> Cache<S, St> {
    /// Wraps `next`, storing responses in `store`.
    pub fn new(next: S, store: St) -> Self {
        Self { next, store }
    }

    /// The store responses are kept in.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// The wrapped sender.
    pub fn inner(&self) -> &S {
        &self.next
    }

    async fn send_cached(&self, request: Request) -> Result<Response> {
        if request.method() != Method::GET {
            return self.next.send(request).await;
        }

        let key = normalize_url(&request.uri().to_string());
        if has_directive(request.headers(), "only-if-cached") {
            return Ok(match self.store.get(&key) {
                Some(stored) => {
                    tracing::debug!(key = %key, "answered from store");
                    stored_response(stored)
                }
                None => {
                    tracing::debug!(key = %key, "only-if-cached miss");
                    Response::buffered(StatusCode::GATEWAY_TIMEOUT, HeaderMap::new(), Bytes::new())
                }
            });
        }

        let response = self.next.send(request).await?;
        if response.status() != StatusCode::OK || has_directive(response.headers(), "no-store") {
            return Ok(response);
        }

        let status = response.status();
        let headers = response.headers().clone();
        let content = response.bytes().await?;
        self.store.set(&key, header_info(&headers), content.clone());
        tracing::trace!(key = %key, bytes = content.len(), "response stored");

        Ok(Response::buffered(status, headers, content))
    }
}

impl<S: Sender, St: Store> Sender for Cache<S, St> {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send {
        self.send_cached(request)
    }
}

/// Whether any `Cache-Control` header carries `directive`.
fn has_directive(headers: &HeaderMap, directive: &str) -> bool {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|d| d.trim().eq_ignore_ascii_case(directive))
}

/// Flattens headers into store info; repeated headers are joined with `, `.
fn header_info(headers: &HeaderMap) -> Info {
    let mut info = Info::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        info.entry(name.as_str().to_string())
            .and_modify(|joined: &mut String| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    info
}

fn stored_response(stored: Stored) -> Response {
    let mut headers = HeaderMap::with_capacity(stored.info.len() + 1);
    for (name, value) in &stored.info {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(VIA, HeaderValue::from_static(VIA_VALUE));
    Response::buffered(StatusCode::OK, headers, stored.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with a fixed response and counts calls.
    struct Fixed {
        status: StatusCode,
        cache_control: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(status: StatusCode, cache_control: Option<&'static str>) -> Self {
            Self {
                status,
                cache_control,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Sender for Fixed {
        fn send(&self, _request: Request) -> impl Future<Output = Result<Response>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut headers = HeaderMap::new();
            headers.insert("content-type", HeaderValue::from_static("text/plain"));
            if let Some(cc) = self.cache_control {
                headers.insert(CACHE_CONTROL, HeaderValue::from_static(cc));
            }
            let response = Response::buffered(self.status, headers, Bytes::from_static(b"payload"));
            async move { Ok(response) }
        }
    }

    fn only_if_cached(url: &str) -> Request {
        Request::get(url)
            .unwrap()
            .with_header("Cache-Control", "only-if-cached")
            .unwrap()
    }

    #[tokio::test]
    async fn only_if_cached_miss_is_a_local_504() {
        let cache = Cache::new(Fixed::new(StatusCode::OK, None), MemoryStore::new(1024));

        let response = cache.send(only_if_cached("http://example.org/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stored_response_is_served_with_via() {
        let cache = Cache::new(Fixed::new(StatusCode::OK, None), MemoryStore::new(1024));

        let first = cache.send(Request::get("http://Example.org").unwrap()).await.unwrap();
        assert_eq!(first.text().await.unwrap(), "payload");

        let hit = cache.send(only_if_cached("http://example.org/")).await.unwrap();
        assert_eq!(hit.status(), StatusCode::OK);
        assert_eq!(hit.header(VIA), Some(VIA_VALUE));
        assert_eq!(hit.header("content-type"), Some("text/plain"));
        assert_eq!(hit.text().await.unwrap(), "payload");
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_store_and_errors_are_not_kept() {
        let cache = Cache::new(
            Fixed::new(StatusCode::OK, Some("max-age=0, No-Store")),
            MemoryStore::new(1024),
        );
        cache.send(Request::get("http://example.org/a").unwrap()).await.unwrap();
        assert!(cache.store().is_empty());

        let cache = Cache::new(Fixed::new(StatusCode::NOT_FOUND, None), MemoryStore::new(1024));
        cache.send(Request::get("http://example.org/a").unwrap()).await.unwrap();
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn other_methods_pass_through() {
        let cache = Cache::new(Fixed::new(StatusCode::OK, None), MemoryStore::new(1024));
        let request = Request::new(Method::POST, "http://example.org/").unwrap();
        cache.send(request).await.unwrap();
        assert!(cache.store().is_empty());
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("x-a", HeaderValue::from_static("1"));
        headers.append("x-a", HeaderValue::from_static("2"));
        let info = header_info(&headers);
        assert_eq!(info.get("x-a").map(String::as_str), Some("1, 2"));
    }
}
