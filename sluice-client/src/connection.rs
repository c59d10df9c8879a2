//! Persistent HTTP/1.1 connections to one destination.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::destination::Destination;
use crate::error::{Error, Result};

/// One keep-alive HTTP/1.1 connection. Carries a single exchange at a time;
/// requests are never pipelined.
#[derive(Debug)]
pub(crate) struct Connection {
    sender: SendRequest<Full<Bytes>>,
}

impl Connection {
    /// Opens a TCP connection and performs the HTTP/1 handshake.
    pub(crate) async fn dial(destination: &Destination) -> Result<Self> {
        let stream = TcpStream::connect((destination.dial_host(), destination.port()))
            .await
            .map_err(|source| Error::Connect {
                destination: destination.clone(),
                source,
            })?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::trace!(destination = %destination, error = %err, "set_nodelay failed");
        }

        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;

        // The connection task owns the socket; it ends when the peer closes or
        // every handle to `sender` is gone.
        let destination = destination.clone();
        tokio::spawn(async move {
            match conn.await {
                Ok(()) => tracing::trace!(destination = %destination, "connection closed"),
                Err(err) => {
                    tracing::debug!(destination = %destination, error = %err, "connection ended with error")
                }
            }
        });

        Ok(Self { sender })
    }

    /// Whether hyper has already seen this connection close.
    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Writes `request` and reads the response head.
    pub(crate) async fn send(
        &mut self,
        request: hyper::Request<Full<Bytes>>,
    ) -> std::result::Result<hyper::Response<Incoming>, hyper::Error> {
        self.sender.ready().await?;
        self.sender.send_request(request).await
    }
}

/// Whether `err` means the peer closed a kept-alive connection before the
/// exchange could complete. Only such failures on reused connections are
/// retried.
pub(crate) fn is_stale(err: &hyper::Error) -> bool {
    err.is_closed() || err.is_incomplete_message() || err.is_canceled()
}
