//! Remote analytics API surface consumed by the sqlvet engine.
//!
//! This crate defines the [`AnalyticsClient`] trait that concrete API
//! transports implement, plus the wire-shape types for query-task
//! results. The validation engine in `sqlvet-core` is written entirely
//! against this trait, so tests (and alternative backends) can swap in
//! their own client.

pub mod client;
pub mod error;
pub mod types;

// Re-export the primary public API at the crate level.
pub use client::{AnalyticsClient, CreatedQuery};
pub use error::ApiError;
pub use types::{QueryTaskStatus, RawData, RawDetails, RawError, RawResult, SqlErrorLocation};
