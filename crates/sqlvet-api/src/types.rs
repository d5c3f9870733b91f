//! Wire shapes for query-task results.
//!
//! The analytics API reports task results as a JSON envelope whose
//! `data` member is polymorphic: an object with runtime/sql/error
//! details for executed queries, or a bare list whose first element is
//! an error message. Anything else is malformed and the engine treats
//! it as fatal.

use std::fmt;

use serde::Deserialize;

/// Status reported for a query task.
///
/// Only `complete` and `error` are terminal; every other status means
/// the task should be polled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTaskStatus {
    Complete,
    Error,
    Running,
    Added,
    Expired,
}

impl QueryTaskStatus {
    /// Parse a status string from the API.
    ///
    /// Returns `None` for statuses outside the known set; the engine
    /// treats those as fatal rather than guessing at their semantics.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            "running" => Some(Self::Running),
            "added" => Some(Self::Added),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether this status ends the task's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for QueryTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Running => "running",
            Self::Added => "added",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// The raw result envelope for one query task.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResult {
    /// Status string as reported; validated against
    /// [`QueryTaskStatus`] by the engine.
    pub status: String,
    /// Polymorphic result payload. Absent for tasks that have not
    /// started producing output yet.
    #[serde(default)]
    pub data: Option<RawData>,
}

/// The polymorphic `data` member of a raw result.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawData {
    /// Object form: runtime, compiled SQL, and structured errors.
    Details(RawDetails),
    /// List form: the first element is the bare error message.
    Messages(Vec<String>),
}

/// Object-form result payload. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetails {
    /// Query runtime in seconds.
    pub runtime: Option<f64>,
    /// Compiled SQL for the query.
    pub sql: Option<String>,
    /// Structured error reports, when the backend returns several.
    pub errors: Option<Vec<RawError>>,
    /// Singular error report, used by some backends instead of
    /// `errors`.
    pub error: Option<RawError>,
}

/// One structured error report inside a raw result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawError {
    pub message: Option<String>,
    pub message_details: Option<String>,
    pub sql_error_loc: Option<SqlErrorLocation>,
}

/// Location information attached to a SQL error report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqlErrorLocation {
    pub line: Option<u32>,
}

impl RawDetails {
    /// All error reports carried by this payload, normalizing the
    /// singular `error` member into the list form.
    pub fn error_reports(&self) -> Vec<RawError> {
        match (&self.errors, &self.error) {
            (Some(errors), _) if !errors.is_empty() => errors.clone(),
            (_, Some(error)) => vec![error.clone()],
            _ => Vec::new(),
        }
    }
}
