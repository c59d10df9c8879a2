//! Point-in-time views of the scheduler.

use sluice_core::Priority;

use crate::destination::Destination;

/// Scheduler state as seen by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    /// The global execution limit.
    pub global_limit: usize,
    /// Requests currently executing across all pools.
    pub in_flight: usize,
    /// One entry per pool that has ever queued work, ordered by destination.
    pub pools: Vec<PoolStats>,
}

impl SchedulerStats {
    /// The entry for `destination`, if its pool has queued work before.
    pub fn pool(&self, destination: &Destination) -> Option<&PoolStats> {
        self.pools.iter().find(|p| p.destination == *destination)
    }

    /// Requests queued but not yet started, across all pools.
    pub fn pending(&self) -> usize {
        self.pools.iter().map(|p| p.pending).sum()
    }
}

/// State of one destination pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// The pool's destination.
    pub destination: Destination,
    /// Requests queued and not yet granted.
    pub pending: usize,
    /// Requests granted and not yet completed.
    pub active: usize,
    /// Current connection limit.
    pub capacity: usize,
    /// Kept-alive connections parked for reuse.
    pub idle_connections: usize,
    /// Best queued priority, when anything is queued.
    pub best_priority: Option<Priority>,
}
