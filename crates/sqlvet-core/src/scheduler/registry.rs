//! The task-id registry: the source of truth for outstanding work.
//!
//! The launcher registers every query task it creates; the poller
//! removes entries as terminal results arrive, taking ownership of the
//! query for resolution. On interrupt the orchestrator drains whatever
//! is left and cancels those tasks remotely.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::query::Query;

#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    inner: Mutex<HashMap<String, Query>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, task_id: String, query: Query) {
        self.lock().insert(task_id, query);
    }

    /// Remove a task, transferring ownership of its query to the
    /// caller.
    pub(crate) fn remove(&self, task_id: &str) -> Option<Query> {
        self.lock().remove(task_id)
    }

    /// Remove and return every outstanding task id.
    pub(crate) fn drain_ids(&self) -> Vec<String> {
        self.lock().drain().map(|(task_id, _)| task_id).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Query>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Dimension, Explore};

    fn query() -> Query {
        let dimension = Dimension::new("ecommerce", "orders", "orders.total");
        let explore = Explore::new("ecommerce", "orders", vec![dimension]);
        Query::for_explore(explore, 500)
    }

    #[test]
    fn remove_transfers_ownership_once() {
        let registry = TaskRegistry::new();
        registry.insert("task-1".to_string(), query());

        assert!(registry.remove("task-1").is_some());
        assert!(registry.remove("task-1").is_none());
    }

    #[test]
    fn drain_empties_the_registry() {
        let registry = Arc::new(TaskRegistry::new());
        registry.insert("task-1".to_string(), query());
        registry.insert("task-2".to_string(), query());

        let mut ids = registry.drain_ids();
        ids.sort();
        assert_eq!(ids, ["task-1", "task-2"]);
        assert!(registry.drain_ids().is_empty());
    }
}
