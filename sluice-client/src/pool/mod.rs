//! Per-destination pools.
//!
//! Each pool runs as its own task owning a priority queue of submitted
//! requests. It tells the driver about queued work and starts one request per
//! grant it receives back, always the best-priority one queued at that time.
//! Every grant is answered with the best priority still queued, which the
//! driver waits for before ranking the pool again.

mod exec;
pub(crate) mod slots;

use std::sync::Arc;

use sluice_core::RequestQueue;
use tokio::sync::{mpsc, oneshot};

use crate::destination::Destination;
use crate::driver::DriverHandle;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

use self::slots::Slots;

/// Identifies a pool to the driver.
pub(crate) type PoolId = u64;

/// The parts of a pool shared between its task, its executions and the driver.
#[derive(Debug)]
pub(crate) struct PoolLink {
    pub(crate) id: PoolId,
    pub(crate) destination: Destination,
    pub(crate) slots: Arc<Slots>,
    grants: mpsc::UnboundedSender<()>,
}

impl PoolLink {
    /// Lets the pool start one more request. Returns `false` if the pool
    /// task has stopped.
    pub(crate) fn grant(&self) -> bool {
        self.grants.send(()).is_ok()
    }
}

/// A request waiting in a pool, with the channel its outcome goes to.
pub(crate) struct Submission {
    pub(crate) request: Request,
    pub(crate) completion: oneshot::Sender<Result<Response>>,
}

/// Settings every execution of a pool needs.
#[derive(Debug)]
pub(crate) struct ExecSettings {
    pub(crate) user_agent: String,
}

/// Handle to a running pool task.
#[derive(Debug, Clone)]
pub(crate) struct PoolHandle {
    link: Arc<PoolLink>,
    submissions: mpsc::Sender<Submission>,
}

impl PoolHandle {
    /// Starts the pool task for `destination` on the current runtime.
    pub(crate) fn spawn(
        id: PoolId,
        destination: Destination,
        capacity: usize,
        depth: usize,
        settings: Arc<ExecSettings>,
        driver: DriverHandle,
    ) -> Self {
        let (grants, grant_rx) = mpsc::unbounded_channel();
        let (submissions, submission_rx) = mpsc::channel(depth.max(1));
        let link = Arc::new(PoolLink {
            id,
            destination,
            slots: Slots::new(capacity),
            grants,
        });

        tracing::debug!(destination = %link.destination, capacity = link.slots.capacity(), "pool started");
        tokio::spawn(run(
            Arc::clone(&link),
            submission_rx,
            grant_rx,
            driver,
            settings,
        ));

        Self { link, submissions }
    }

    pub(crate) fn link(&self) -> &Arc<PoolLink> {
        &self.link
    }

    /// Queues a request. Waits while the submission queue is full.
    pub(crate) async fn submit(&self, submission: Submission) -> Result<()> {
        self.submissions
            .send(submission)
            .await
            .map_err(|_| Error::Shutdown)
    }
}

async fn run(
    link: Arc<PoolLink>,
    mut submissions: mpsc::Receiver<Submission>,
    mut grants: mpsc::UnboundedReceiver<()>,
    driver: DriverHandle,
    settings: Arc<ExecSettings>,
) {
    let mut queue: RequestQueue<Submission> = RequestQueue::new();
    let mut accepting = true;

    loop {
        tokio::select! {
            submission = submissions.recv(), if accepting => match submission {
                Some(submission) => {
                    let priority = submission.request.effective_priority();
                    queue.push(priority, submission);
                    let best = queue.peek_priority().unwrap_or(priority);
                    tracing::trace!(
                        destination = %link.destination,
                        priority,
                        queued = queue.len(),
                        "request queued"
                    );
                    driver.pending(&link, best).await;
                }
                None => accepting = false,
            },
            grant = grants.recv() => {
                if grant.is_none() {
                    break;
                }
                let popped = queue.pop();
                driver.reprioritized(&link, queue.peek_priority()).await;
                let Some(submission) = popped else {
                    // Grants never outnumber queued requests; give it back.
                    tracing::warn!(destination = %link.destination, "grant with empty queue");
                    driver.completed(&link).await;
                    continue;
                };
                tokio::spawn(exec::hookup(
                    Arc::clone(&link),
                    submission,
                    driver.clone(),
                    Arc::clone(&settings),
                ));
            }
        }

        if !accepting && queue.is_empty() {
            break;
        }
    }

    tracing::debug!(destination = %link.destination, "pool stopped");
}
