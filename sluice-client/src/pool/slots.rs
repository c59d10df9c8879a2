//! Connection slots for one destination.
//!
//! A slot is the right to hold one connection. Slots are counted by a
//! semaphore sized to the pool's capacity; connections that finished an
//! exchange cleanly wait in a lock-free idle queue for the next slot holder.
//! A slot stays taken until the response body that uses its connection has
//! been read to the end or dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::connection::Connection;
use crate::error::{Error, Result};

#[derive(Debug)]
pub(crate) struct Slots {
    permits: Arc<Semaphore>,
    idle: SegQueue<Connection>,
    /// Target number of slots.
    capacity: AtomicUsize,
    /// Slots currently in existence, free or lent. Exceeds `capacity` while a
    /// shrink waits for lent slots to come back.
    issued: AtomicUsize,
}

impl Slots {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(capacity)),
            idle: SegQueue::new(),
            capacity: AtomicUsize::new(capacity),
            issued: AtomicUsize::new(capacity),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Waits for a free slot.
    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<SlotLease> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Shutdown)?;
        Ok(SlotLease {
            slots: Arc::clone(self),
            permit: Some(permit),
        })
    }

    /// Changes the number of slots. Growth is immediate; free slots above the
    /// new capacity are removed now and lent ones when they are returned.
    pub(crate) fn resize(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity.store(capacity, Ordering::Release);

        let mut issued = self.issued.load(Ordering::Acquire);
        while issued < capacity {
            match self.issued.compare_exchange_weak(
                issued,
                capacity,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.permits.add_permits(capacity - issued);
                    break;
                }
                Err(actual) => issued = actual,
            }
        }

        while self.issued.load(Ordering::Acquire) > self.capacity() {
            let Ok(permit) = self.permits.try_acquire() else {
                break;
            };
            if !self.retire_one() {
                break;
            }
            permit.forget();
            drop(self.idle.pop());
        }
    }

    /// Pops an idle connection that is not known to be closed.
    fn try_pop(&self) -> Option<Connection> {
        while let Some(conn) = self.idle.pop() {
            // A connection that looks open may still turn out stale once used.
            if !conn.is_closed() {
                return Some(conn);
            }
        }
        None
    }

    /// Parks a connection for reuse.
    fn push(&self, conn: Connection) {
        if conn.is_closed() {
            return;
        }
        self.idle.push(conn);
    }

    /// Accounts for one slot going away if the pool is over capacity.
    fn retire_one(&self) -> bool {
        let mut issued = self.issued.load(Ordering::Acquire);
        loop {
            if issued <= self.capacity() {
                return false;
            }
            match self.issued.compare_exchange_weak(
                issued,
                issued - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => issued = actual,
            }
        }
    }
}

/// A held slot. Dropping it frees the slot and discards whatever connection
/// it was used with; [`SlotLease::release`] returns a reusable connection to
/// the idle queue first.
#[derive(Debug)]
pub(crate) struct SlotLease {
    slots: Arc<Slots>,
    permit: Option<OwnedSemaphorePermit>,
}

impl SlotLease {
    /// An idle connection to reuse, if one is parked.
    pub(crate) fn take_idle(&self) -> Option<Connection> {
        self.slots.try_pop()
    }

    /// Frees the slot, keeping `conn` for the next holder.
    pub(crate) fn release(mut self, conn: Connection) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        if self.slots.retire_one() {
            permit.forget();
            return;
        }
        self.slots.push(conn);
        drop(permit);
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            if self.slots.retire_one() {
                permit.forget();
            }
        }
    }
}
