//! Executing one granted request.

use std::sync::Arc;

use crate::connection::{is_stale, Connection};
use crate::driver::DriverHandle;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

use super::{ExecSettings, PoolLink, Submission};

/// Runs one granted request, delivers its outcome and tells the driver the
/// grant is spent.
pub(super) async fn hookup(
    link: Arc<PoolLink>,
    submission: Submission,
    driver: DriverHandle,
    settings: Arc<ExecSettings>,
) {
    let Submission {
        request,
        completion,
    } = submission;

    if completion.is_closed() {
        tracing::debug!(
            destination = %link.destination,
            uri = %request.uri(),
            "caller gave up before execution, skipping"
        );
    } else {
        let outcome = execute(&link, &request, &settings.user_agent).await;
        match &outcome {
            Ok(response) => tracing::debug!(
                destination = %link.destination,
                method = %request.method(),
                uri = %request.uri(),
                status = response.status().as_u16(),
                "response received"
            ),
            Err(err) => tracing::warn!(
                destination = %link.destination,
                method = %request.method(),
                uri = %request.uri(),
                error = %err,
                "request failed"
            ),
        }
        if completion.send(outcome).is_err() {
            tracing::debug!(destination = %link.destination, "caller gone, response dropped");
        }
    }

    driver.completed(&link).await;
}

/// Sends `request` on a pooled or fresh connection.
///
/// If a reused connection turns out to have been closed by the server, the
/// request is replayed once on a newly dialed connection under the same slot.
/// Failures on fresh connections are returned as-is.
async fn execute(link: &PoolLink, request: &Request, user_agent: &str) -> Result<Response> {
    let mut wire = request.to_hyper(user_agent)?;
    let lease = link.slots.acquire().await?;

    let (mut conn, mut reused) = match lease.take_idle() {
        Some(conn) => (conn, true),
        None => (Connection::dial(&link.destination).await?, false),
    };

    loop {
        match conn.send(wire).await {
            Ok(response) => return Ok(Response::from_hyper(response, lease, conn)),
            Err(err) if reused && is_stale(&err) => {
                tracing::debug!(
                    destination = %link.destination,
                    error = %err,
                    "pooled connection was closed by the server, redialing"
                );
                drop(conn);
                conn = Connection::dial(&link.destination).await?;
                reused = false;
                wire = request.to_hyper(user_agent)?;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
