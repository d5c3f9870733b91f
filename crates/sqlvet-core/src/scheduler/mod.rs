//! The adaptive concurrent query scheduler.
//!
//! Two long-running workers cooperate over two queues: the launcher
//! drains the *run queue* of [`Query`] values and turns each into a
//! remote query task, bounded by a counting semaphore; the poller
//! drains the *poll queue* of task ids, fetches results in batches,
//! and either re-enqueues still-running tasks or resolves terminal
//! ones -- attributing errors to references, or subdividing an errored
//! multi-dimension query back onto the run queue to localize the
//! failure.
//!
//! ```text
//! search -> run queue -> launcher -> poll queue -> poller
//!              ^                                     |
//!              +--------- subdivision children ------+
//! ```
//!
//! The orchestrator seeds one query per explore, waits for the
//! pending-work counter to drain, and owns interrupt handling: on
//! cancellation it stops both workers, drains the task registry, and
//! issues a best-effort cancel for every outstanding query task.

mod launcher;
mod pending;
mod poller;
mod registry;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::join_all;
use sqlvet_api::AnalyticsClient;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::ValidatorConfig;
use crate::error::ValidatorError;
use crate::model::Explore;
use crate::profile::{ProfilerRow, format_profile_table};
use crate::query::Query;

use pending::PendingWork;
use registry::TaskRegistry;

/// Maximum task ids per polling call, capping the API payload size.
pub const QUERY_TASK_LIMIT: usize = 250;

/// Spacing between polling cycles.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// State shared between the orchestrator and its workers.
struct Shared {
    client: Arc<dyn AnalyticsClient>,
    /// Concurrency slots: acquired by the launcher before a task is
    /// created, released by the poller on terminal status.
    slot: Arc<Semaphore>,
    registry: TaskRegistry,
    pending: PendingWork,
    /// Producer side of the run queue; the poller enqueues subdivision
    /// children here, and `None` is the launcher shutdown sentinel.
    run_tx: mpsc::UnboundedSender<Option<Query>>,
    /// Producer side of the poll queue, used to re-enqueue
    /// still-running task ids.
    poll_tx: mpsc::UnboundedSender<String>,
    fail_fast: bool,
    runtime_threshold: u64,
    profile_rows: Mutex<Vec<ProfilerRow>>,
}

impl Shared {
    fn push_profile(&self, row: ProfilerRow) {
        self.profile_rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(row);
    }

    fn take_profile_rows(&self) -> Vec<ProfilerRow> {
        std::mem::take(
            &mut *self
                .profile_rows
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

/// Runs and validates the SQL for every dimension of the selected
/// explores.
pub struct SqlValidator {
    client: Arc<dyn AnalyticsClient>,
    config: ValidatorConfig,
    /// Profiler rows accumulated across runs of this validator.
    long_running: Mutex<Vec<ProfilerRow>>,
}

impl SqlValidator {
    pub fn new(client: Arc<dyn AnalyticsClient>, config: ValidatorConfig) -> Self {
        Self {
            client,
            config,
            long_running: Mutex::new(Vec::new()),
        }
    }

    /// Queries whose terminal runtime met the profiler threshold, in
    /// observation order.
    pub fn long_running_queries(&self) -> Vec<ProfilerRow> {
        self.long_running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Validate the given explores.
    ///
    /// Seeds one query per explore covering all of its dimensions and
    /// runs the pipeline to completion. In fail-fast mode errors are
    /// reported at explore granularity; otherwise errored queries are
    /// recursively subdivided until each failure is attributed to a
    /// single dimension. SQL failures land on the references
    /// themselves (see [`Explore::errors`]); only pipeline failures
    /// are returned as `Err`.
    ///
    /// Cancelling `cancel` interrupts the run: outstanding query tasks
    /// are cancelled remotely (best effort) and the run fails with
    /// [`ValidatorError::Interrupted`].
    pub async fn search(
        &self,
        explores: &[Arc<Explore>],
        fail_fast: bool,
        profile: bool,
        cancel: CancellationToken,
    ) -> Result<(), ValidatorError> {
        let (run_tx, run_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            client: self.client.clone(),
            slot: Arc::new(Semaphore::new(self.config.concurrency)),
            registry: TaskRegistry::new(),
            pending: PendingWork::new(),
            run_tx,
            poll_tx,
            fail_fast,
            runtime_threshold: self.config.runtime_threshold,
            profile_rows: Mutex::new(Vec::new()),
        });

        // Workers get a child token so normal completion can stop them
        // without cancelling the caller's token.
        let worker_cancel = cancel.child_token();
        let launcher = tokio::spawn(launcher::run_launcher(
            shared.clone(),
            run_rx,
            worker_cancel.clone(),
        ));
        let poller = tokio::spawn(poller::run_poller(
            shared.clone(),
            poll_rx,
            worker_cancel.clone(),
        ));

        // Seed the run queue: one query per explore, covering all of
        // its dimensions.
        for explore in explores {
            let query = Query::for_explore(explore.clone(), self.config.chunk_size);
            shared.pending.add(1);
            if shared.run_tx.send(Some(query)).is_err() {
                break;
            }
        }

        let interrupted = tokio::select! {
            _ = shared.pending.join() => false,
            _ = cancel.cancelled() => true,
        };

        // Shut both workers down: sentinel for the launcher, token for
        // the poller, then collect their outcomes.
        let _ = shared.run_tx.send(None);
        worker_cancel.cancel();
        let launcher_outcome = flatten_worker(launcher.await);
        let poller_outcome = flatten_worker(poller.await);

        if interrupted {
            let cancelled = self.cancel_outstanding(&shared).await;
            return Err(ValidatorError::Interrupted { cancelled });
        }

        launcher_outcome?;
        poller_outcome?;

        {
            let mut long_running = self
                .long_running
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            long_running.extend(shared.take_profile_rows());
            if profile {
                let table = format_profile_table(&long_running, self.config.runtime_threshold);
                tracing::info!("query profiler results\n{table}");
            }
        }

        Ok(())
    }

    /// Compile the SQL for one explore without executing it as a task.
    ///
    /// Creates a single query over all of the explore's dimensions and
    /// runs it through the synchronous query path to recover the
    /// generated SQL.
    pub async fn compile_sql(&self, explore: &Arc<Explore>) -> Result<String, ValidatorError> {
        if explore.dimensions().is_empty() {
            return Err(ValidatorError::MissingDimensions {
                explore: explore.name().to_string(),
            });
        }
        let mut query = Query::for_explore(explore.clone(), self.config.chunk_size);
        let query_id = query.create(self.client.as_ref()).await?;
        let sql = self.client.run_query(query_id).await?;
        Ok(sql)
    }

    /// Best-effort cancellation of every outstanding query task.
    /// Returns the number of cancel calls attempted.
    async fn cancel_outstanding(&self, shared: &Shared) -> usize {
        let task_ids = shared.registry.drain_ids();
        if task_ids.is_empty() {
            return 0;
        }

        tracing::info!(
            outstanding = task_ids.len(),
            "asking the backend to cancel running query tasks"
        );
        let cancels = task_ids.iter().map(|task_id| {
            let client = self.client.clone();
            async move {
                if let Err(err) = client.cancel_query_task(task_id).await {
                    tracing::warn!(task_id = %task_id, error = %err, "failed to cancel query task");
                }
            }
        });
        join_all(cancels).await;
        task_ids.len()
    }
}

/// Collapse a worker's join outcome into the pipeline error surface.
fn flatten_worker(
    joined: Result<Result<(), ValidatorError>, tokio::task::JoinError>,
) -> Result<(), ValidatorError> {
    match joined {
        Ok(outcome) => outcome,
        Err(join_err) => Err(ValidatorError::InvalidState {
            reason: format!("pipeline worker aborted: {join_err}"),
        }),
    }
}
