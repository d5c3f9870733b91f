//! The `AnalyticsClient` trait -- the adapter interface for the remote
//! analytics API.
//!
//! Each concrete transport (HTTP SDK, recorded fixtures, mocks)
//! implements this trait. The trait is intentionally object-safe so it
//! can be shared as `Arc<dyn AnalyticsClient>` by the engine's workers.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ApiError;

/// The remote identifiers handed back by a successful create-query call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedQuery {
    /// Numeric query id, used to run the query or create a query task.
    pub id: i64,
    /// URL where the query can be explored in the analytics UI.
    pub share_url: String,
}

/// Adapter interface for the asynchronous query API of an analytics
/// backend.
///
/// Implementors translate these calls into whatever wire protocol the
/// backend speaks. The engine only ever:
///
/// 1. Creates a query over a set of dimension names.
/// 2. Either runs it inline to recover compiled SQL, or creates a
///    query *task* (an asynchronous execution handle).
/// 3. Polls task results in batches until each task is terminal.
/// 4. Cancels outstanding tasks when interrupted.
///
/// # Object Safety
///
/// This trait is object-safe: every method returns a concrete type.
/// The engine stores it as `Arc<dyn AnalyticsClient>`.
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    /// Create a query against `explore` in `model` selecting the given
    /// dimension names.
    ///
    /// `fields` restricts the response payload; the engine always asks
    /// for `["id", "share_url"]`.
    async fn create_query(
        &self,
        model: &str,
        explore: &str,
        dimensions: &[String],
        fields: &[&str],
    ) -> Result<CreatedQuery, ApiError>;

    /// Run a previously created query synchronously, returning its
    /// compiled SQL text.
    async fn run_query(&self, query_id: i64) -> Result<String, ApiError>;

    /// Start asynchronous execution of a query, returning the task id.
    async fn create_query_task(&self, query_id: i64) -> Result<String, ApiError>;

    /// Fetch raw results for a batch of query tasks.
    ///
    /// The returned map is keyed by task id. Values are the raw JSON
    /// result envelopes; parsing them is the engine's job (shapes vary
    /// by status, see [`crate::types`]).
    async fn get_query_task_multi_results(
        &self,
        task_ids: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, ApiError>;

    /// Ask the backend to cancel a running query task.
    ///
    /// Cancellation is best-effort; the backend may have already
    /// finished or may ignore the request.
    async fn cancel_query_task(&self, task_id: &str) -> Result<(), ApiError>;
}

// Compile-time assertion: AnalyticsClient must be object-safe.
// If this line compiles, the trait can be used as `dyn AnalyticsClient`.
const _: () = {
    fn _assert_object_safe(_: &dyn AnalyticsClient) {}
};
