//! The driver task: global admission control.
//!
//! The driver is the only owner of the admission heap and the global in-flight
//! count. Pools and execution tasks report to it over a bounded channel; it
//! answers with execution grants over each pool's unbounded grant channel, so
//! it never waits on a pool. Outstanding grants per pool are bounded by that
//! pool's capacity.

use std::collections::HashMap;
use std::sync::Arc;

use sluice_core::{Admission, Priority};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::pool::{PoolId, PoolLink};
use crate::stats::{PoolStats, SchedulerStats};

enum Event {
    Pending {
        link: Arc<PoolLink>,
        priority: Priority,
    },
    Reprioritized {
        link: Arc<PoolLink>,
        priority: Option<Priority>,
    },
    Completed {
        link: Arc<PoolLink>,
    },
    Resized {
        link: Arc<PoolLink>,
    },
    Snapshot(oneshot::Sender<SchedulerStats>),
}

/// Sending side of the driver's event queue.
#[derive(Debug, Clone)]
pub(crate) struct DriverHandle {
    events: mpsc::Sender<Event>,
}

impl DriverHandle {
    /// Spawns the driver onto the current Tokio runtime.
    pub(crate) fn spawn(global_limit: usize, depth: usize) -> Self {
        let (events, rx) = mpsc::channel(depth.max(1));
        tokio::spawn(run(Admission::new(global_limit), rx));
        Self { events }
    }

    /// The pool queued a request; `priority` is its best queued priority.
    pub(crate) async fn pending(&self, link: &Arc<PoolLink>, priority: Priority) {
        self.send(Event::Pending {
            link: Arc::clone(link),
            priority,
        })
        .await;
    }

    /// The pool took a request off its queue for a grant; `priority` is the
    /// best one left, if any. The pool is not granted again until this arrives.
    pub(crate) async fn reprioritized(&self, link: &Arc<PoolLink>, priority: Option<Priority>) {
        self.send(Event::Reprioritized {
            link: Arc::clone(link),
            priority,
        })
        .await;
    }

    /// One granted execution of the pool finished.
    pub(crate) async fn completed(&self, link: &Arc<PoolLink>) {
        self.send(Event::Completed {
            link: Arc::clone(link),
        })
        .await;
    }

    /// The pool's slot capacity changed.
    pub(crate) async fn resized(&self, link: &Arc<PoolLink>) {
        self.send(Event::Resized {
            link: Arc::clone(link),
        })
        .await;
    }

    /// A snapshot of the scheduler state.
    pub(crate) async fn stats(&self) -> Result<SchedulerStats> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(Event::Snapshot(tx))
            .await
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    async fn send(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("driver is gone, dropping event");
        }
    }
}

async fn run(mut admission: Admission<PoolId>, mut events: mpsc::Receiver<Event>) {
    let mut links: HashMap<PoolId, Arc<PoolLink>> = HashMap::new();
    tracing::debug!(global_limit = admission.global_limit(), "driver started");

    while let Some(event) = events.recv().await {
        match event {
            Event::Pending { link, priority } => {
                admission.report_pending(link.id, priority, link.slots.capacity());
                links.entry(link.id).or_insert(link);
            }
            Event::Reprioritized { link, priority } => {
                admission.report_priority(link.id, priority, link.slots.capacity());
            }
            Event::Completed { link } => {
                admission.report_completed(link.id, link.slots.capacity());
            }
            Event::Resized { link } => {
                admission.report_capacity(link.id, link.slots.capacity());
                links.entry(link.id).or_insert(link);
            }
            Event::Snapshot(reply) => {
                let _ = reply.send(snapshot(&admission, &links));
            }
        }

        for id in admission.admit() {
            let Some(link) = links.get(&id) else {
                continue;
            };
            if link.grant() {
                tracing::trace!(
                    destination = %link.destination,
                    in_flight = admission.in_flight(),
                    "granted execution"
                );
            } else {
                // The pool task is gone, so the grant can never complete.
                tracing::warn!(destination = %link.destination, "pool task gone, revoking grant");
                admission.report_completed(id, 0);
            }
        }
    }

    tracing::debug!("driver stopped");
}

fn snapshot(admission: &Admission<PoolId>, links: &HashMap<PoolId, Arc<PoolLink>>) -> SchedulerStats {
    let mut pools: Vec<PoolStats> = admission
        .snapshots()
        .filter_map(|(id, snap)| {
            let link = links.get(&id)?;
            Some(PoolStats {
                destination: link.destination.clone(),
                pending: snap.pending,
                active: snap.active,
                capacity: link.slots.capacity(),
                idle_connections: link.slots.idle_count(),
                best_priority: (snap.pending > 0).then_some(snap.priority),
            })
        })
        .collect();
    pools.sort_by_key(|p| p.destination.to_string());

    SchedulerStats {
        global_limit: admission.global_limit(),
        in_flight: admission.in_flight(),
        pools,
    }
}
