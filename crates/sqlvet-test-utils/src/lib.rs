//! Shared test utilities for sqlvet integration tests.
//!
//! Provides a scripted in-memory [`MockAnalyticsClient`], explore
//! fixture builders, and a tracing initializer. The mock honors the
//! engine's contract with the real API: queries get incrementing ids,
//! query tasks report `running` for a configurable number of polls
//! before going terminal, and terminal outcomes are scripted per
//! explore or per dimension.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use sqlvet_api::{AnalyticsClient, ApiError, CreatedQuery};
use sqlvet_core::model::{Dimension, Explore};

/// The two development-mode notices the engine must discard.
pub const BENIGN_NOTICE: &str =
    "Note: This query contains derived tables with conditional SQL for Development Mode. \
     Query results in Production Mode might be different.";

/// Initialize tracing for a test binary. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build an explore with `count` synthetic dimensions named
/// `<explore>.dim_<i>`.
pub fn explore_fixture(model: &str, explore: &str, count: usize) -> Arc<Explore> {
    let dimensions = (0..count)
        .map(|i| {
            Dimension::with_url(
                model,
                explore,
                format!("{explore}.dim_{i}"),
                format!("https://analytics.example.com/projects/{model}/files/{explore}.view"),
            )
        })
        .collect();
    Explore::with_url(
        model,
        explore,
        format!("https://analytics.example.com/explore/{model}/{explore}"),
        dimensions,
    )
}

/// How a scripted query task ends.
#[derive(Debug, Clone)]
enum Terminal {
    Complete {
        runtime: f64,
    },
    Error {
        payload: ErrorPayload,
    },
    UnknownStatus {
        status: String,
    },
    /// Never reaches a terminal status; used by interrupt tests.
    Hang,
}

#[derive(Debug, Clone)]
enum ErrorPayload {
    Structured {
        message: String,
        line: Option<u32>,
    },
    BenignOnly,
    BareMessage {
        message: String,
    },
}

/// Predicate over the queries a script entry applies to.
#[derive(Debug, Clone)]
struct Matcher {
    model: String,
    explore: String,
    /// When set, only queries covering this dimension match.
    dimension: Option<String>,
}

impl Matcher {
    fn matches(&self, query: &QuerySpec) -> bool {
        if query.model != self.model || query.explore != self.explore {
            return false;
        }
        match &self.dimension {
            Some(dimension) => query.dimensions.iter().any(|name| name == dimension),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptEntry {
    matcher: Matcher,
    terminal: Terminal,
}

#[derive(Debug, Clone)]
struct QuerySpec {
    model: String,
    explore: String,
    dimensions: Vec<String>,
}

#[derive(Debug, Default)]
struct MockState {
    next_query_id: i64,
    queries: HashMap<i64, QuerySpec>,
    /// Dimension lists of every created query, in creation order.
    created_queries: Vec<Vec<String>>,
    /// task id -> (query id, polls left before terminal).
    tasks: HashMap<String, (i64, usize)>,
    created_tasks: usize,
    cancelled: Vec<String>,
}

/// A scripted analytics backend.
///
/// Defaults: every query completes with a 0.1 s runtime after one
/// `running` poll. Scripted outcomes are checked in registration
/// order; the first match wins.
pub struct MockAnalyticsClient {
    script: Vec<ScriptEntry>,
    running_polls: usize,
    reject_create: Option<(String, String, String)>,
    state: Mutex<MockState>,
}

impl Default for MockAnalyticsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAnalyticsClient {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            running_polls: 1,
            reject_create: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Number of `running` polls each task reports before its terminal
    /// status. Zero means terminal on the first poll.
    pub fn running_polls(mut self, polls: usize) -> Self {
        self.running_polls = polls;
        self
    }

    /// Any query covering `dimension` errors with a structured report.
    pub fn fail_dimension(
        mut self,
        model: &str,
        explore: &str,
        dimension: &str,
        message: &str,
        line: Option<u32>,
    ) -> Self {
        self.script.push(ScriptEntry {
            matcher: Matcher {
                model: model.to_string(),
                explore: explore.to_string(),
                dimension: Some(dimension.to_string()),
            },
            terminal: Terminal::Error {
                payload: ErrorPayload::Structured {
                    message: message.to_string(),
                    line,
                },
            },
        });
        self
    }

    /// Every query against `explore` errors with a structured report.
    pub fn fail_explore(
        mut self,
        model: &str,
        explore: &str,
        message: &str,
        line: Option<u32>,
    ) -> Self {
        self.script.push(ScriptEntry {
            matcher: explore_matcher(model, explore),
            terminal: Terminal::Error {
                payload: ErrorPayload::Structured {
                    message: message.to_string(),
                    line,
                },
            },
        });
        self
    }

    /// Every query against `explore` errors, but the only report is a
    /// benign development-mode notice.
    pub fn benign_failure(mut self, model: &str, explore: &str) -> Self {
        self.script.push(ScriptEntry {
            matcher: explore_matcher(model, explore),
            terminal: Terminal::Error {
                payload: ErrorPayload::BenignOnly,
            },
        });
        self
    }

    /// Every query against `explore` errors with list-shaped data
    /// carrying a bare message.
    pub fn bare_message_failure(mut self, model: &str, explore: &str, message: &str) -> Self {
        self.script.push(ScriptEntry {
            matcher: explore_matcher(model, explore),
            terminal: Terminal::Error {
                payload: ErrorPayload::BareMessage {
                    message: message.to_string(),
                },
            },
        });
        self
    }

    /// Every query against `explore` reports a status outside the
    /// known set.
    pub fn unknown_status(mut self, model: &str, explore: &str, status: &str) -> Self {
        self.script.push(ScriptEntry {
            matcher: explore_matcher(model, explore),
            terminal: Terminal::UnknownStatus {
                status: status.to_string(),
            },
        });
        self
    }

    /// Tasks for `explore` never go terminal.
    pub fn hang_explore(mut self, model: &str, explore: &str) -> Self {
        self.script.push(ScriptEntry {
            matcher: explore_matcher(model, explore),
            terminal: Terminal::Hang,
        });
        self
    }

    /// Queries against `explore` complete with the given runtime.
    pub fn slow_complete(mut self, model: &str, explore: &str, runtime: f64) -> Self {
        self.script.push(ScriptEntry {
            matcher: explore_matcher(model, explore),
            terminal: Terminal::Complete { runtime },
        });
        self
    }

    /// Reject create-query calls for `explore`.
    pub fn reject_create_query(mut self, model: &str, explore: &str, message: &str) -> Self {
        self.reject_create = Some((model.to_string(), explore.to_string(), message.to_string()));
        self
    }

    /// Dimension lists of every created query, in creation order.
    pub fn created_queries(&self) -> Vec<Vec<String>> {
        self.lock().created_queries.clone()
    }

    pub fn created_task_count(&self) -> usize {
        self.lock().created_tasks
    }

    /// Task ids the engine asked to cancel, in call order.
    pub fn cancelled(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn terminal_for(&self, query: &QuerySpec) -> Terminal {
        self.script
            .iter()
            .find(|entry| entry.matcher.matches(query))
            .map(|entry| entry.terminal.clone())
            .unwrap_or(Terminal::Complete { runtime: 0.1 })
    }

    fn result_for(&self, query: &QuerySpec, terminal: &Terminal) -> Value {
        let sql = compiled_sql(query);
        match terminal {
            Terminal::Complete { runtime } => json!({
                "status": "complete",
                "data": {"runtime": runtime, "sql": sql}
            }),
            Terminal::Error { payload } => match payload {
                ErrorPayload::Structured { message, line } => {
                    let mut error = json!({"message": message});
                    if let Some(line) = line {
                        error["sql_error_loc"] = json!({"line": line});
                    }
                    json!({
                        "status": "error",
                        "data": {"runtime": 0.1, "sql": sql, "errors": [error]}
                    })
                }
                ErrorPayload::BenignOnly => json!({
                    "status": "error",
                    "data": {"runtime": 0.1, "sql": sql, "errors": [{"message": BENIGN_NOTICE}]}
                }),
                ErrorPayload::BareMessage { message } => json!({
                    "status": "error",
                    "data": [message]
                }),
            },
            Terminal::UnknownStatus { status } => json!({"status": status}),
            Terminal::Hang => json!({"status": "running"}),
        }
    }
}

fn explore_matcher(model: &str, explore: &str) -> Matcher {
    Matcher {
        model: model.to_string(),
        explore: explore.to_string(),
        dimension: None,
    }
}

fn compiled_sql(query: &QuerySpec) -> String {
    format!(
        "SELECT {} FROM {}.{}",
        query.dimensions.join(", "),
        query.model,
        query.explore
    )
}

#[async_trait]
impl AnalyticsClient for MockAnalyticsClient {
    async fn create_query(
        &self,
        model: &str,
        explore: &str,
        dimensions: &[String],
        _fields: &[&str],
    ) -> Result<CreatedQuery, ApiError> {
        if let Some((m, e, message)) = &self.reject_create {
            if m == model && e == explore {
                return Err(ApiError::Rejected(message.clone()));
            }
        }

        let mut state = self.lock();
        state.next_query_id += 1;
        let id = state.next_query_id;
        state.queries.insert(
            id,
            QuerySpec {
                model: model.to_string(),
                explore: explore.to_string(),
                dimensions: dimensions.to_vec(),
            },
        );
        state.created_queries.push(dimensions.to_vec());
        Ok(CreatedQuery {
            id,
            share_url: format!("https://analytics.example.com/x/{id}"),
        })
    }

    async fn run_query(&self, query_id: i64) -> Result<String, ApiError> {
        let state = self.lock();
        let query = state
            .queries
            .get(&query_id)
            .ok_or_else(|| ApiError::Rejected(format!("unknown query id {query_id}")))?;
        Ok(compiled_sql(query))
    }

    async fn create_query_task(&self, query_id: i64) -> Result<String, ApiError> {
        let mut state = self.lock();
        if !state.queries.contains_key(&query_id) {
            return Err(ApiError::Rejected(format!("unknown query id {query_id}")));
        }
        let task_id = Uuid::new_v4().to_string();
        state.tasks.insert(task_id.clone(), (query_id, self.running_polls));
        state.created_tasks += 1;
        Ok(task_id)
    }

    async fn get_query_task_multi_results(
        &self,
        task_ids: &[String],
    ) -> Result<HashMap<String, Value>, ApiError> {
        let mut state = self.lock();
        let mut results = HashMap::new();
        for task_id in task_ids {
            let Some((query_id, polls_left)) = state.tasks.get(task_id).copied() else {
                continue;
            };
            if polls_left > 0 {
                state.tasks.insert(task_id.clone(), (query_id, polls_left - 1));
                results.insert(task_id.clone(), json!({"status": "running"}));
                continue;
            }
            let Some(query) = state.queries.get(&query_id).cloned() else {
                continue;
            };
            let terminal = self.terminal_for(&query);
            results.insert(task_id.clone(), self.result_for(&query, &terminal));
        }
        Ok(results)
    }

    async fn cancel_query_task(&self, task_id: &str) -> Result<(), ApiError> {
        self.lock().cancelled.push(task_id.to_string());
        Ok(())
    }
}
