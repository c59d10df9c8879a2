//! Sluice Core functionality.
//!
//! This crate contains the runtime-free building blocks of the Sluice HTTP
//! client: request priorities, the per-destination request queue, the
//! index-tracked admission heap and the admission state machine that enforces
//! global and per-destination concurrency limits, plus the bounded in-memory
//! store used by the caching layer.
//!
//! Nothing in here performs I/O or spawns tasks. The `sluice-client` crate
//! wires these pieces into Tokio tasks.

pub mod domain;
pub mod scheduling;
pub mod store;

pub use domain::priority::{Priority, DEFAULT_PRIORITY};
pub use domain::url::normalize_url;
pub use scheduling::admission::{Admission, PoolSnapshot};
pub use scheduling::indexed_heap::{HeapIndex, IndexedHeap};
pub use scheduling::request_queue::RequestQueue;
pub use store::memory::MemoryStore;
pub use store::{Info, Store, Stored};

/// Default ceiling on requests executing concurrently across all destinations.
pub const DEFAULT_LIMIT_GLOBAL: usize = 40;

/// Default ceiling on requests executing concurrently against one destination.
pub const DEFAULT_LIMIT_PER_DESTINATION: usize = 6;
