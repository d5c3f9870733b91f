//! Parsing of raw query-task results into the engine's terms.
//!
//! Raw envelopes come back from the client's multi-result call as
//! untyped JSON; this module turns them into [`QueryResult`]s,
//! discarding the backend's benign development-mode notices along the
//! way. A malformed envelope is a fatal
//! [`ValidatorError::UnexpectedResultFormat`] -- the engine would
//! rather stop than misattribute errors.

use sqlvet_api::{QueryTaskStatus, RawData, RawError, RawResult};

use crate::error::ValidatorError;

/// Notices the backend attaches to queries on development-mode
/// branches. They describe the query, not a failure, and are never
/// attributed to a reference.
pub const BENIGN_MESSAGES: [&str; 2] = [
    "Note: This query contains derived tables with conditional SQL for Development Mode. \
     Query results in Production Mode might be different.",
    "Note: This query contains derived tables with Development Mode filters. \
     Query results in Production Mode might be different.",
];

/// One structured error report extracted from a raw result.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    pub message: Option<String>,
    pub message_details: Option<String>,
    pub line_number: Option<u32>,
}

impl ErrorDetail {
    /// `message` and `message_details`, space-joined, nulls dropped.
    pub fn full_message(&self) -> String {
        [self.message.as_deref(), self.message_details.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether this report is one of the benign development-mode
    /// notices.
    pub fn is_benign(&self) -> bool {
        self.message
            .as_deref()
            .is_some_and(|message| BENIGN_MESSAGES.contains(&message))
    }
}

impl From<RawError> for ErrorDetail {
    fn from(raw: RawError) -> Self {
        Self {
            message: raw.message,
            message_details: raw.message_details,
            line_number: raw.sql_error_loc.and_then(|loc| loc.line),
        }
    }
}

/// Drop benign development-mode notices from a list of error reports.
///
/// Idempotent: filtering an already-filtered list changes nothing.
pub fn filter_benign(details: Vec<ErrorDetail>) -> Vec<ErrorDetail> {
    details
        .into_iter()
        .filter(|detail| !detail.is_benign())
        .collect()
}

/// Parsed outcome for one query task.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub task_id: String,
    pub status: QueryTaskStatus,
    /// Query runtime in seconds, when the backend reported one.
    pub runtime: Option<f64>,
    /// Error reports with benign notices already filtered out. May be
    /// empty even for `error` results, when every report was benign.
    pub errors: Vec<ErrorDetail>,
    /// Compiled SQL of the query, when the backend returned it.
    pub sql: Option<String>,
}

/// Parse one raw result envelope.
pub fn parse_raw_result(
    task_id: &str,
    raw: &serde_json::Value,
) -> Result<QueryResult, ValidatorError> {
    let envelope: RawResult = serde_json::from_value(raw.clone()).map_err(|err| {
        ValidatorError::UnexpectedResultFormat {
            detail: format!("task {task_id}: {err}"),
        }
    })?;

    let status = QueryTaskStatus::parse(&envelope.status).ok_or_else(|| {
        ValidatorError::UnexpectedStatus {
            status: envelope.status.clone(),
        }
    })?;

    let (runtime, sql) = match &envelope.data {
        Some(RawData::Details(details)) => (details.runtime, details.sql.clone()),
        _ => (None, None),
    };

    let errors = if status == QueryTaskStatus::Error {
        extract_error_details(task_id, envelope.data.as_ref())?
    } else {
        Vec::new()
    };

    Ok(QueryResult {
        task_id: task_id.to_string(),
        status,
        runtime,
        errors,
        sql,
    })
}

/// Pull the error reports out of an `error` result's data payload.
fn extract_error_details(
    task_id: &str,
    data: Option<&RawData>,
) -> Result<Vec<ErrorDetail>, ValidatorError> {
    match data {
        Some(RawData::Details(details)) => Ok(filter_benign(
            details
                .error_reports()
                .into_iter()
                .map(ErrorDetail::from)
                .collect(),
        )),
        Some(RawData::Messages(messages)) => {
            let first = messages.first().ok_or_else(|| {
                ValidatorError::UnexpectedResultFormat {
                    detail: format!("task {task_id}: error result carried an empty message list"),
                }
            })?;
            Ok(filter_benign(vec![ErrorDetail {
                message: Some(first.clone()),
                message_details: None,
                line_number: None,
            }]))
        }
        None => Err(ValidatorError::UnexpectedResultFormat {
            detail: format!("task {task_id}: error result carried no data"),
        }),
    }
}
