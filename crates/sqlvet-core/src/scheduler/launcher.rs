//! The launcher: drains the run queue and turns queries into remote
//! query tasks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ValidatorError;
use crate::query::Query;

use super::Shared;

/// Consume the run queue until the shutdown sentinel (`None`) arrives,
/// the channel closes, or the pipeline is cancelled.
///
/// For each query: acquire one concurrency slot (held until the poller
/// observes the task's terminal status), create the remote query and
/// its query task, register the task id, and hand it to the poller.
///
/// On failure the pending-work counter is closed before the error
/// propagates, so the orchestrator's join cannot deadlock on queries
/// that will never be launched.
pub(super) async fn run_launcher(
    shared: Arc<Shared>,
    mut run_rx: mpsc::UnboundedReceiver<Option<Query>>,
    cancel: CancellationToken,
) -> Result<(), ValidatorError> {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = run_rx.recv() => item,
        };
        let query = match item {
            Some(Some(query)) => query,
            // Sentinel or closed channel: normal shutdown.
            Some(None) | None => {
                tracing::debug!("launcher received shutdown sentinel");
                break;
            }
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = shared.slot.clone().acquire_owned() => permit,
        };
        match permit {
            // The permit is released by the poller, not by dropping.
            Ok(permit) => permit.forget(),
            Err(_) => break,
        }

        let launched = tokio::select! {
            _ = cancel.cancelled() => break,
            launched = launch_one(&shared, query) => launched,
        };
        if let Err(err) = launched {
            tracing::error!(error = %err, "launcher failed, aborting the run");
            shared.pending.close();
            return Err(err);
        }
    }

    Ok(())
}

async fn launch_one(shared: &Shared, mut query: Query) -> Result<(), ValidatorError> {
    let query_id = query.create(shared.client.as_ref()).await?;
    let task_id = shared.client.create_query_task(query_id).await?;

    tracing::debug!(
        task_id = %task_id,
        query_id,
        explore = %query.explore().name(),
        dimensions = query.dimensions().len(),
        "launched query task"
    );

    shared.registry.insert(task_id.clone(), query);
    // The poller only stops after the orchestrator has observed queue
    // drain, so a send failure here can only happen during teardown.
    let _ = shared.poll_tx.send(task_id);
    Ok(())
}
