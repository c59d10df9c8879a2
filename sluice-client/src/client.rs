//! The scheduling client.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::config::ClientConfig;
use crate::destination::Destination;
use crate::driver::DriverHandle;
use crate::error::{Error, Result};
use crate::pool::{ExecSettings, PoolHandle, Submission};
use crate::request::Request;
use crate::response::Response;
use crate::sender::Sender;
use crate::stats::SchedulerStats;

/// An HTTP/1.1 client that schedules requests by priority.
///
/// Requests are queued in one pool per destination. A request starts only
/// when both its destination and the client as a whole are below their
/// concurrency limits; among the pools with spare capacity, the one holding
/// the lowest priority value goes first.
///
/// Cloning is cheap and clones share the same pools and limits.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    settings: Arc<ExecSettings>,
    driver: DriverHandle,
    pools: DashMap<Destination, PoolHandle>,
    next_pool_id: AtomicU64,
}

impl Client {
    /// Creates a client and starts its driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::Config(
                "a client must be created inside a Tokio runtime".into(),
            ));
        }

        let driver = DriverHandle::spawn(config.limit_global, config.event_depth);
        tracing::info!(
            limit_global = config.limit_global,
            limit_per_destination = config.limit_per_destination,
            "client started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                settings: Arc::new(ExecSettings {
                    user_agent: config.user_agent.clone(),
                }),
                config,
                driver,
                pools: DashMap::new(),
                next_pool_id: AtomicU64::new(0),
            }),
        })
    }

    /// Creates a client with the given limits and default settings otherwise.
    pub fn with_limits(limit_global: usize, limit_per_destination: usize) -> Result<Self> {
        Self::new(ClientConfig {
            limit_global,
            limit_per_destination,
            ..ClientConfig::default()
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Queues `request` in its destination's pool and waits for the response
    /// head.
    ///
    /// Requests that cannot be routed fail here without being queued. With a
    /// request timeout configured, a request still queued when the timeout
    /// fires is skipped; one already executing is abandoned and its
    /// connection discarded.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let destination = request.destination()?;
        let pool = self.pool(&destination);

        let (completion, outcome) = oneshot::channel();
        pool.submit(Submission {
            request,
            completion,
        })
        .await?;

        match self.inner.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, outcome).await {
                Ok(outcome) => outcome.map_err(|_| Error::Shutdown)?,
                Err(_) => Err(Error::Timeout(limit)),
            },
            None => outcome.await.map_err(|_| Error::Shutdown)?,
        }
    }

    /// Changes the connection limit for `destination`. Values below one are
    /// raised to one.
    ///
    /// Raising the limit lets queued requests start right away. Lowering it
    /// lets executing requests finish; new ones start once the destination
    /// is back under the new limit.
    pub async fn set_limit(&self, destination: &Destination, limit: usize) {
        let pool = self.pool(destination);
        pool.link().slots.resize(limit);
        tracing::info!(
            destination = %destination,
            limit = pool.link().slots.capacity(),
            "destination limit changed"
        );
        self.inner.driver.resized(pool.link()).await;
    }

    /// The current connection limit for `destination`.
    pub fn limit(&self, destination: &Destination) -> usize {
        match self.inner.pools.get(destination) {
            Some(pool) => pool.link().slots.capacity(),
            None => self.inner.config.limit_for(destination),
        }
    }

    /// A snapshot of queued and executing requests.
    pub async fn stats(&self) -> Result<SchedulerStats> {
        self.inner.driver.stats().await
    }

    /// The pool for `destination`, started on first use.
    fn pool(&self, destination: &Destination) -> PoolHandle {
        if let Some(pool) = self.inner.pools.get(destination) {
            return pool.clone();
        }
        self.inner
            .pools
            .entry(destination.clone())
            .or_insert_with(|| {
                let id = self.inner.next_pool_id.fetch_add(1, Ordering::Relaxed);
                PoolHandle::spawn(
                    id,
                    destination.clone(),
                    self.inner.config.limit_for(destination),
                    self.inner.config.submission_depth,
                    Arc::clone(&self.inner.settings),
                    self.inner.driver.clone(),
                )
            })
            .clone()
    }
}

impl Sender for Client {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send {
        Client::send(self, request)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("limit_global", &self.inner.config.limit_global)
            .field("pools", &self.inner.pools.len())
            .finish_non_exhaustive()
    }
}
