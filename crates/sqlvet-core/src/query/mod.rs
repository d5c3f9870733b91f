//! A bundle of dimensions from one explore, sent to the backend as one
//! remote query.
//!
//! Queries start wide (every dimension of an explore) and narrow by
//! subdivision when they error: halves for small queries, fixed-size
//! windows for very wide ones, until the failing dimension is isolated.

use std::sync::Arc;

use sqlvet_api::{AnalyticsClient, ApiError};

use crate::error::ValidatorError;
use crate::model::{Dimension, Explore, QueryRef};

/// Response fields requested on every create-query call.
const QUERY_FIELDS: &[&str] = &["id", "share_url"];

/// One remote analytical query over a subset of an explore's
/// dimensions.
///
/// Invariant: the dimension list is non-empty, and every dimension
/// belongs to the query's explore.
#[derive(Debug, Clone)]
pub struct Query {
    explore: Arc<Explore>,
    dimensions: Vec<Arc<Dimension>>,
    chunk_size: usize,
    query_id: Option<i64>,
    explore_url: Option<String>,
    /// `None` until a terminal result is observed.
    errored: Option<bool>,
}

impl Query {
    pub fn new(explore: Arc<Explore>, dimensions: Vec<Arc<Dimension>>, chunk_size: usize) -> Self {
        debug_assert!(!dimensions.is_empty(), "query must cover at least one dimension");
        debug_assert!(
            dimensions.iter().all(|dimension| {
                dimension.model_name() == explore.model_name()
                    && dimension.explore_name() == explore.name()
            }),
            "query dimensions must belong to the query's explore"
        );
        Self {
            explore,
            dimensions,
            chunk_size,
            query_id: None,
            explore_url: None,
            errored: None,
        }
    }

    /// A query covering every dimension of `explore`.
    pub fn for_explore(explore: Arc<Explore>, chunk_size: usize) -> Self {
        let dimensions = explore.dimensions().to_vec();
        Self::new(explore, dimensions, chunk_size)
    }

    pub fn explore(&self) -> &Arc<Explore> {
        &self.explore
    }

    pub fn dimensions(&self) -> &[Arc<Dimension>] {
        &self.dimensions
    }

    pub fn dimension_names(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .map(|dimension| dimension.name().to_string())
            .collect()
    }

    pub fn query_id(&self) -> Option<i64> {
        self.query_id
    }

    pub fn explore_url(&self) -> Option<&str> {
        self.explore_url.as_deref()
    }

    pub fn errored(&self) -> Option<bool> {
        self.errored
    }

    pub fn set_errored(&mut self, errored: bool) {
        self.errored = Some(errored);
    }

    /// The reference a terminal result for this query speaks about:
    /// the single dimension once the search has narrowed that far,
    /// otherwise the whole explore.
    pub fn reference(&self) -> QueryRef {
        if let [dimension] = self.dimensions() {
            QueryRef::Dimension(dimension.clone())
        } else {
            QueryRef::Explore(self.explore.clone())
        }
    }

    /// Register this query with the backend, recording the assigned
    /// query id and share URL. Returns the assigned id.
    pub async fn create(&mut self, client: &dyn AnalyticsClient) -> Result<i64, ApiError> {
        let created = client
            .create_query(
                self.explore.model_name(),
                self.explore.name(),
                &self.dimension_names(),
                QUERY_FIELDS,
            )
            .await?;
        self.query_id = Some(created.id);
        self.explore_url = Some(created.share_url);
        Ok(created.id)
    }

    /// Split an errored multi-dimension query into narrower children.
    ///
    /// Wide queries (more than `2 * chunk_size` dimensions) split into
    /// consecutive windows of `chunk_size` so one bad result does not
    /// fan out into thousands of half-width retries; everything else
    /// splits into two halves, keeping the search binary. The union of
    /// the children's dimensions is exactly the parent's, in order.
    pub fn divide(&self) -> Result<Vec<Query>, ValidatorError> {
        if self.errored != Some(true) {
            return Err(ValidatorError::InvalidState {
                reason: format!(
                    "cannot divide a query that has not errored (explore '{}')",
                    self.explore.name()
                ),
            });
        }
        if self.dimensions.len() < 2 {
            return Err(ValidatorError::InvalidState {
                reason: format!(
                    "cannot divide a single-dimension query (explore '{}')",
                    self.explore.name()
                ),
            });
        }

        let windows: Vec<&[Arc<Dimension>]> = if self.dimensions.len() / 2 > self.chunk_size {
            self.dimensions.chunks(self.chunk_size).collect()
        } else {
            let mid = self.dimensions.len() / 2;
            let (left, right) = self.dimensions.split_at(mid);
            vec![left, right]
        };

        Ok(windows
            .into_iter()
            .map(|window| Query::new(self.explore.clone(), window.to_vec(), self.chunk_size))
            .collect())
    }
}
