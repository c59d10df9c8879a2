//! Sluice Client Engine
//!
//! The Tokio async engine behind the Sluice HTTP/1.1 client: connection slots
//! and keep-alive reuse per destination, a task per destination pool, and the
//! driver task that admits queued requests by priority under global and
//! per-destination limits.
//!
//! ```no_run
//! # async fn demo() -> sluice_client::Result<()> {
//! use sluice_client::{verbs, Client, Request};
//!
//! let client = Client::with_limits(40, 6)?;
//!
//! // When limits are saturated the urgent request is admitted first.
//! let (urgent, bulk) = tokio::join!(
//!     client.send(Request::get("http://example.org/")?.with_priority(1)),
//!     verbs::get(&client, "http://example.org/archive"),
//! );
//! println!("{} {}", urgent?.status(), bulk?.text().await?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod client;
pub mod config;
mod connection;
pub mod destination;
mod driver;
pub mod error;
mod pool;
pub mod request;
pub mod response;
pub mod sender;
pub mod stats;
pub mod verbs;

pub use cache::Cache;
pub use client::Client;
pub use config::ClientConfig;
pub use destination::Destination;
pub use error::{Error, Result};
pub use request::Request;
pub use response::{Body, Response};
pub use sender::Sender;
pub use stats::{PoolStats, SchedulerStats};

pub use sluice_core::{MemoryStore, Priority, Store, DEFAULT_PRIORITY};
