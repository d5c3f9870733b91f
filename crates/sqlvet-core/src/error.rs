//! The engine's fatal error surface.
//!
//! Every variant here aborts a validation run. SQL failures discovered
//! in query results are *not* errors in this sense; they are attributed
//! to references as [`crate::model::SqlError`] data and reported after
//! the run.

use sqlvet_api::ApiError;

/// Fatal errors raised by the validation engine.
///
/// Callers present these as a one-line [`title`](ValidatorError::title)
/// followed by the Display output as the detail paragraph.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unable to extract error details from a query result: {detail}")]
    UnexpectedResultFormat { detail: String },

    #[error("query result status '{status}' was returned by the analytics API")]
    UnexpectedStatus { status: String },

    #[error("{reason}")]
    InvalidState { reason: String },

    #[error(
        "explore '{explore}' has no dimensions, so the validation query would have \
         no fields and would always error"
    )]
    MissingDimensions { explore: String },

    #[error("{}", interrupt_detail(.cancelled))]
    Interrupted { cancelled: usize },
}

impl ValidatorError {
    /// One-line headline for user-facing reporting.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Api(_) => "Error communicating with the analytics API.",
            Self::UnexpectedResultFormat { .. } => {
                "Encountered an unexpected query result format."
            }
            Self::UnexpectedStatus { .. } => "Encountered an unexpected query result status.",
            Self::InvalidState { .. } => "The validator reached an invalid internal state.",
            Self::MissingDimensions { .. } => "Missing dimensions.",
            Self::Interrupted { .. } => "SQL validation was manually interrupted.",
        }
    }

    /// Number of cancelled query tasks, when this is an interrupt.
    pub fn cancelled_queries(&self) -> Option<usize> {
        match self {
            Self::Interrupted { cancelled } => Some(*cancelled),
            _ => None,
        }
    }
}

fn interrupt_detail(cancelled: &usize) -> String {
    match cancelled {
        0 => "No queries were running at the time so nothing was cancelled.".to_string(),
        1 => "Attempted to cancel 1 running query.".to_string(),
        n => format!("Attempted to cancel {n} running queries."),
    }
}
