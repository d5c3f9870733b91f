//! Completion accounting for the run queue.
//!
//! Every query placed on the run queue (seed or subdivision child)
//! must eventually be marked done exactly once, when its terminal
//! result is observed. [`PendingWork`] tracks that count and lets the
//! orchestrator wait for it to reach zero; worker failure paths call
//! [`PendingWork::close`] so the wait can never hang on work that will
//! no longer be finished.

use std::sync::Mutex;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    count: usize,
    closed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PendingWork {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl PendingWork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record `n` newly enqueued queries.
    pub(crate) fn add(&self, n: usize) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.count += n;
        }
    }

    /// Record one terminal observation.
    pub(crate) fn task_done(&self) {
        let mut inner = self.lock();
        if inner.closed {
            // A worker already aborted the run; late terminal results
            // from the survivor are irrelevant to the join.
            return;
        }
        debug_assert!(inner.count > 0, "task_done without matching add");
        inner.count = inner.count.saturating_sub(1);
        if inner.count == 0 {
            drop(inner);
            self.notify.notify_waiters();
        }
    }

    /// Force-complete all outstanding work. Used on worker failure so
    /// [`PendingWork::join`] cannot deadlock.
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.count = 0;
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Wait until every enqueued query has been marked done.
    pub(crate) async fn join(&self) {
        loop {
            // Register interest before checking, so a task_done racing
            // with the check cannot be missed.
            let notified = self.notify.notified();
            if self.lock().count == 0 {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn join_returns_immediately_when_nothing_is_pending() {
        let pending = PendingWork::new();
        tokio::time::timeout(Duration::from_secs(1), pending.join())
            .await
            .expect("join should not block");
    }

    #[tokio::test]
    async fn join_waits_for_every_task_done() {
        let pending = Arc::new(PendingWork::new());
        pending.add(2);

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.join().await })
        };

        pending.task_done();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        pending.task_done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("join should resolve after the final task_done")
            .expect("join task should not panic");
    }

    #[tokio::test]
    async fn close_releases_a_blocked_join() {
        let pending = Arc::new(PendingWork::new());
        pending.add(5);

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.join().await })
        };

        pending.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("join should resolve after close")
            .expect("join task should not panic");
    }

    #[tokio::test]
    async fn late_bookkeeping_after_close_is_ignored() {
        let pending = PendingWork::new();
        pending.add(3);
        pending.close();

        // A surviving worker may still observe terminal results or
        // subdivide after the abort; neither may disturb the join.
        pending.task_done();
        pending.add(2);

        tokio::time::timeout(Duration::from_secs(1), pending.join())
            .await
            .expect("join should stay released after close");
    }
}
