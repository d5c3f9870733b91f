/// Errors returned by an [`crate::AnalyticsClient`] implementation.
///
/// The engine treats any of these as fatal for the run: an API failure
/// while creating or polling queries aborts validation rather than
/// producing a partial result.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("the analytics API rejected the request: {0}")]
    Rejected(String),

    #[error("failed to reach the analytics API: {0}")]
    Transport(String),

    #[error("the analytics API returned an unusable response: {0}")]
    InvalidResponse(String),
}
