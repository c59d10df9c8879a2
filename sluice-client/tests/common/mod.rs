//! Common test utilities for integration tests
//!
//! Local HTTP/1.1 servers on ephemeral ports, built on hyper's server side,
//! plus a few polling helpers.

#![allow(dead_code)]

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use sluice_client::{Client, Destination, SchedulerStats};
use tokio::net::TcpListener;

/// A running test server.
pub struct TestServer {
    /// Where the server listens.
    pub addr: SocketAddr,
    /// TCP connections accepted so far.
    pub connections: Arc<AtomicUsize>,
}

impl TestServer {
    /// An absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// The destination requests to this server are pooled under.
    pub fn destination(&self) -> Destination {
        Destination::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Serves every connection with `handler` until the test ends.
pub async fn serve<F, Fut>(handler: F) -> TestServer
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let accepted = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accepted.fetch_add(1, Ordering::SeqCst);

            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let response = handler(req);
                    async move { Ok::<_, Infallible>(response.await) }
                });
                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    eprintln!("Error serving connection: {:?}", err);
                }
            });
        }
    });

    TestServer { addr, connections }
}

/// A response with `status` and a text body.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(Full::new(Bytes::from(body.into())))
        .unwrap()
}

/// A redirect to `location`.
pub fn redirect(status: StatusCode, location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("location", location)
        .body(Full::new(Bytes::from_static(b"moved")))
        .unwrap()
}

/// Answers with `METHOD PATH` on the first line and the request body after
/// it, and reflects selected request headers as `x-request-*`.
pub async fn echo(req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await.unwrap().to_bytes();

    let mut builder = Response::builder().status(StatusCode::OK);
    for name in ["host", "user-agent", "content-type", "authorization"] {
        if let Some(value) = parts.headers.get(name) {
            builder = builder.header(format!("x-request-{name}"), value.clone());
        }
    }

    let mut out = format!("{} {}\n", parts.method, parts.uri).into_bytes();
    out.extend_from_slice(&body);
    builder.body(Full::new(Bytes::from(out))).unwrap()
}

/// Sends `request` and reads the whole body as text.
pub async fn fetch_text(client: Client, request: sluice_client::Request) -> String {
    client.send(request).await.unwrap().text().await.unwrap()
}

/// Polls the client's stats until `ready` holds, failing after five seconds.
pub async fn wait_for_stats<F>(client: &Client, mut ready: F) -> SchedulerStats
where
    F: FnMut(&SchedulerStats) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = client.stats().await.unwrap();
        if ready(&stats) {
            return stats;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "scheduler never reached expected state: {stats:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Tracks how many handler invocations overlap.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    /// Marks one invocation as started; the guard marks it finished.
    pub fn enter(self: &Arc<Self>) -> ConcurrencyGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ConcurrencyGuard(Arc::clone(self))
    }

    /// The highest overlap seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Ends one tracked invocation on drop.
pub struct ConcurrencyGuard(Arc<Concurrency>);

impl Drop for ConcurrencyGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}
