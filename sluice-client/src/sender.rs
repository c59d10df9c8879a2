//! The request-sending abstraction.
//!
//! [`Client`](crate::Client) is the scheduling implementation; decorators such
//! as [`Cache`](crate::Cache) wrap another sender, and the helpers in
//! [`verbs`](crate::verbs) work with any of them.

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// Anything that turns a [`Request`] into a [`Response`].
pub trait Sender: Send + Sync {
    /// Sends `request` and resolves once the response head has arrived.
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<S: Sender> Sender for &S {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send {
        (**self).send(request)
    }
}

impl<S: Sender> Sender for Arc<S> {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send {
        (**self).send(request)
    }
}
