//! SQL validation engine for semantic data models.
//!
//! sqlvet drives a remote analytics API to execute a query against
//! every dimension of every explore in a semantic model and reports
//! the dimensions whose generated SQL fails. The interesting part is
//! the scheduler: a bounded-concurrency pipeline that launches query
//! tasks, polls batched results, and -- in localize mode -- binary-
//! searches errored multi-dimension queries down to the offending
//! dimension.
//!
//! The remote API itself is behind the [`sqlvet_api::AnalyticsClient`]
//! trait; this crate never speaks a wire protocol directly.

pub mod config;
pub mod error;
pub mod model;
pub mod profile;
pub mod query;
pub mod result;
pub mod scheduler;

// Re-export the primary public API at the crate level.
pub use config::ValidatorConfig;
pub use error::ValidatorError;
pub use model::{Dimension, Explore, QueryRef, SqlError};
pub use profile::ProfilerRow;
pub use query::Query;
pub use result::{ErrorDetail, QueryResult};
pub use scheduler::SqlValidator;
