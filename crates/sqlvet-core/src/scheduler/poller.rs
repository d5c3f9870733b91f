//! The poller: batches outstanding task ids, fetches their results,
//! and dispatches terminal statuses to the resolution policy.

use std::sync::Arc;

use sqlvet_api::QueryTaskStatus;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ValidatorError;
use crate::model::{QueryRef, SqlError};
use crate::profile::ProfilerRow;
use crate::query::Query;
use crate::result::{QueryResult, parse_raw_result};

use super::{POLL_INTERVAL, QUERY_TASK_LIMIT, Shared};

/// Poll query-task results until cancelled.
///
/// Each cycle drains up to [`QUERY_TASK_LIMIT`] task ids from the poll
/// queue without blocking, fetches their raw results in one API call,
/// and dispatches each by status: terminal results release a
/// concurrency slot and go through resolution; anything else is
/// re-enqueued for the next cycle. Cycles are spaced by
/// [`POLL_INTERVAL`].
///
/// On a fatal error the poller pushes the shutdown sentinel onto the
/// run queue and closes the pending-work counter before the error
/// propagates, so the launcher drains and the orchestrator's join
/// cannot deadlock.
pub(super) async fn run_poller(
    shared: Arc<Shared>,
    mut poll_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) -> Result<(), ValidatorError> {
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            outcome = poll_cycle(&shared, &mut poll_rx) => outcome,
        };
        if let Err(err) = outcome {
            tracing::error!(error = %err, "poller failed, aborting the run");
            let _ = shared.run_tx.send(None);
            shared.pending.close();
            return Err(err);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

/// One polling cycle: drain, fetch, dispatch.
async fn poll_cycle(
    shared: &Shared,
    poll_rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), ValidatorError> {
    let mut task_ids = Vec::new();
    while task_ids.len() < QUERY_TASK_LIMIT {
        match poll_rx.try_recv() {
            Ok(task_id) => task_ids.push(task_id),
            Err(_) => break,
        }
    }
    if task_ids.is_empty() {
        return Ok(());
    }

    let results = shared
        .client
        .get_query_task_multi_results(&task_ids)
        .await?;

    for task_id in task_ids {
        let Some(raw) = results.get(&task_id) else {
            // The backend did not report on this task; keep polling it.
            let _ = shared.poll_tx.send(task_id);
            continue;
        };
        let result = parse_raw_result(&task_id, raw)?;
        tracing::debug!(task_id = %task_id, status = %result.status, "query task polled");

        if !result.status.is_terminal() {
            let _ = shared.poll_tx.send(task_id);
            continue;
        }

        let Some(query) = shared.registry.remove(&task_id) else {
            tracing::warn!(task_id = %task_id, "terminal result for an unregistered task");
            continue;
        };
        shared.slot.add_permits(1);
        handle_terminal(shared, query, &result)?;
        shared.pending.task_done();
    }

    Ok(())
}

/// Apply a terminal result to its query and references.
fn handle_terminal(
    shared: &Shared,
    mut query: Query,
    result: &QueryResult,
) -> Result<(), ValidatorError> {
    capture_profile(shared, &query, result);

    match result.status {
        QueryTaskStatus::Complete => {
            query.set_errored(false);
            query.explore().mark_queried();
            for dimension in query.dimensions() {
                dimension.mark_queried();
            }
            Ok(())
        }
        QueryTaskStatus::Error => {
            query.set_errored(true);
            resolve_error(shared, query, result)
        }
        _ => Ok(()),
    }
}

/// The resolution policy for an errored query.
///
/// Fail-fast attributes every report to the explore and stops there.
/// In localize mode a multi-dimension query subdivides into children
/// (each a new run-queue item); a single-dimension query has been
/// narrowed all the way down, so the reports are attributed to that
/// dimension.
fn resolve_error(shared: &Shared, query: Query, result: &QueryResult) -> Result<(), ValidatorError> {
    if shared.fail_fast {
        attribute(&QueryRef::Explore(query.explore().clone()), &query, result);
        return Ok(());
    }

    if query.dimensions().len() > 1 {
        let children = query.divide()?;
        tracing::debug!(
            explore = %query.explore().name(),
            parent_dimensions = query.dimensions().len(),
            children = children.len(),
            "subdividing errored query"
        );
        shared.pending.add(children.len());
        for child in children {
            let _ = shared.run_tx.send(Some(child));
        }
        return Ok(());
    }

    attribute(&query.reference(), &query, result);
    Ok(())
}

/// Append one [`SqlError`] per (already filtered) report to `target`.
///
/// When every report was a benign notice there is nothing to attribute,
/// but the reference still counts as queried.
fn attribute(target: &QueryRef, query: &Query, result: &QueryResult) {
    target.mark_queried();
    for detail in &result.errors {
        target.attribute(SqlError {
            model: target.model_name().to_string(),
            explore: target.explore_name().to_string(),
            dimension: target.dimension_name().map(str::to_string),
            sql: result.sql.clone(),
            message: detail.full_message(),
            line_number: detail.line_number,
            lookml_url: target.url().map(str::to_string),
            explore_url: query.explore_url().map(str::to_string),
        });
    }
}

fn capture_profile(shared: &Shared, query: &Query, result: &QueryResult) {
    let Some(runtime) = result.runtime else {
        return;
    };
    if runtime >= shared.runtime_threshold as f64 {
        shared.push_profile(ProfilerRow {
            reference: query.reference(),
            runtime,
            query_id: query.query_id(),
            explore_url: query.explore_url().map(str::to_string),
        });
    }
}
