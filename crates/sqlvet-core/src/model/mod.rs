//! Semantic-model references and the SQL errors attributed to them.
//!
//! Explores and dimensions are produced by a model loader outside this
//! crate and shared (via `Arc`) between the loader, queries in flight,
//! and the result poller. The identifiers are immutable; the only
//! mutable state is the validation outcome -- a growable error list and
//! a `queried` flag -- which lives behind interior mutability and is
//! written exclusively by the poller.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

/// A SQL error attributed to an explore or dimension.
///
/// This is validation *data*, not a control-flow error: the engine
/// collects these on references and keeps running.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlError {
    pub model: String,
    pub explore: String,
    /// Set when the error was localized to a single dimension.
    pub dimension: Option<String>,
    /// Compiled SQL of the failing query, when the backend returned it.
    pub sql: Option<String>,
    /// Error message, with `message_details` appended when present.
    pub message: String,
    /// Line within `sql` the backend pointed at.
    pub line_number: Option<u32>,
    /// Link to the reference's definition in the model source.
    pub lookml_url: Option<String>,
    /// Link to explore the failing query in the analytics UI.
    pub explore_url: Option<String>,
}

/// Mutable validation state shared by both reference kinds.
#[derive(Debug, Default)]
struct RefState {
    errors: Mutex<Vec<SqlError>>,
    queried: AtomicBool,
}

impl RefState {
    fn attribute(&self, error: SqlError) {
        self.queried.store(true, Ordering::Release);
        // A poisoned lock still holds a usable error list.
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(error);
    }

    fn errors(&self) -> Vec<SqlError> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// A named semantic view over a model, composed of dimensions.
#[derive(Debug)]
pub struct Explore {
    model_name: String,
    name: String,
    url: Option<String>,
    dimensions: Vec<Arc<Dimension>>,
    state: RefState,
}

impl Explore {
    pub fn new(
        model_name: impl Into<String>,
        name: impl Into<String>,
        dimensions: Vec<Arc<Dimension>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            model_name: model_name.into(),
            name: name.into(),
            url: None,
            dimensions,
            state: RefState::default(),
        })
    }

    /// Like [`Explore::new`], with a link to the explore's definition.
    pub fn with_url(
        model_name: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        dimensions: Vec<Arc<Dimension>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            model_name: model_name.into(),
            name: name.into(),
            url: Some(url.into()),
            dimensions,
            state: RefState::default(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn dimensions(&self) -> &[Arc<Dimension>] {
        &self.dimensions
    }

    /// Whether a query covering this explore reached a terminal result.
    pub fn queried(&self) -> bool {
        self.state.queried.load(Ordering::Acquire)
    }

    pub fn mark_queried(&self) {
        self.state.queried.store(true, Ordering::Release);
    }

    /// Errors attributed to this explore so far.
    pub fn errors(&self) -> Vec<SqlError> {
        self.state.errors()
    }

    pub fn attribute(&self, error: SqlError) {
        self.state.attribute(error);
    }
}

/// A single named column of an explore; the finest unit the engine
/// attributes errors to.
#[derive(Debug)]
pub struct Dimension {
    model_name: String,
    explore_name: String,
    name: String,
    url: Option<String>,
    state: RefState,
}

impl Dimension {
    pub fn new(
        model_name: impl Into<String>,
        explore_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            model_name: model_name.into(),
            explore_name: explore_name.into(),
            name: name.into(),
            url: None,
            state: RefState::default(),
        })
    }

    /// Like [`Dimension::new`], with a link to the dimension's
    /// definition.
    pub fn with_url(
        model_name: impl Into<String>,
        explore_name: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            model_name: model_name.into(),
            explore_name: explore_name.into(),
            name: name.into(),
            url: Some(url.into()),
            state: RefState::default(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn explore_name(&self) -> &str {
        &self.explore_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn queried(&self) -> bool {
        self.state.queried.load(Ordering::Acquire)
    }

    pub fn mark_queried(&self) {
        self.state.queried.store(true, Ordering::Release);
    }

    pub fn errors(&self) -> Vec<SqlError> {
        self.state.errors()
    }

    pub fn attribute(&self, error: SqlError) {
        self.state.attribute(error);
    }
}

/// A handle to either reference kind, used for error attribution and
/// profiler rows.
///
/// Whether an attributed error names a dimension is decided by which
/// variant the resolution step holds, not by inspecting the error.
#[derive(Debug, Clone)]
pub enum QueryRef {
    Explore(Arc<Explore>),
    Dimension(Arc<Dimension>),
}

impl QueryRef {
    pub fn model_name(&self) -> &str {
        match self {
            Self::Explore(explore) => explore.model_name(),
            Self::Dimension(dimension) => dimension.model_name(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Explore(explore) => explore.name(),
            Self::Dimension(dimension) => dimension.name(),
        }
    }

    /// The explore this reference belongs to (itself, for explores).
    pub fn explore_name(&self) -> &str {
        match self {
            Self::Explore(explore) => explore.name(),
            Self::Dimension(dimension) => dimension.explore_name(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Explore(explore) => explore.url(),
            Self::Dimension(dimension) => dimension.url(),
        }
    }

    /// Reference kind label, as shown in the profiler table.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Explore(_) => "explore",
            Self::Dimension(_) => "dimension",
        }
    }

    /// The dimension name to record on attributed errors, when this
    /// handle points at a dimension.
    pub fn dimension_name(&self) -> Option<&str> {
        match self {
            Self::Explore(_) => None,
            Self::Dimension(dimension) => Some(dimension.name()),
        }
    }

    pub fn mark_queried(&self) {
        match self {
            Self::Explore(explore) => explore.mark_queried(),
            Self::Dimension(dimension) => dimension.mark_queried(),
        }
    }

    pub fn attribute(&self, error: SqlError) {
        match self {
            Self::Explore(explore) => explore.attribute(error),
            Self::Dimension(dimension) => dimension.attribute(error),
        }
    }
}
