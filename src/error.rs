use std::time::Duration;
use thiserror::Error;

/// HTTP status used by upstream services to signal throttling.
pub const RATE_LIMIT_STATUS: u16 = 429;

/// Errors produced by the trip pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum TripError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The text-generation service was unreachable or returned garbage.
    #[error("Itinerary generation failed: {0}")]
    Generation(String),

    /// The generated text contained no usable day sections.
    #[error("Itinerary parsing failed: {0}")]
    Parse(String),

    /// The image job could not be created after bounded retries.
    #[error("Image submission failed: {0}")]
    Submission(String),

    /// The image job never reached a terminal state within its budget.
    #[error("Image job timed out: {0}")]
    PollTimeout(String),

    /// The image service explicitly reported the job as faulted.
    #[error("Image service reported a fault: {0}")]
    RemoteFault(String),

    /// The request was cancelled through its cancellation token.
    #[error("Request was cancelled")]
    Cancelled,

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by the service adapters in [`backend`](crate::backend) when an
    /// upstream returns a non-success status code. `retry_after` is populated
    /// from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl TripError {
    /// Whether this error is an upstream throttling signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            TripError::HttpError {
                status: RATE_LIMIT_STATUS,
                ..
            }
        )
    }

    /// The advisory delay attached to an HTTP error, if the upstream sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TripError::HttpError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error must fail the whole trip request.
    ///
    /// Everything else is absorbed into a degraded field of the result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TripError::Generation(_)
                | TripError::Parse(_)
                | TripError::Cancelled
                | TripError::InvalidConfig(_)
        )
    }
}

impl From<anyhow::Error> for TripError {
    fn from(err: anyhow::Error) -> Self {
        TripError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TripError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        let err = TripError::HttpError {
            status: 429,
            body: "slow down".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));

        let err = TripError::HttpError {
            status: 503,
            body: "unavailable".into(),
            retry_after: None,
        };
        assert!(!err.is_rate_limit());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_fatality_policy() {
        assert!(TripError::Generation("down".into()).is_fatal());
        assert!(TripError::Parse("no days".into()).is_fatal());
        assert!(!TripError::RemoteFault("faulted".into()).is_fatal());
        assert!(!TripError::PollTimeout("budget".into()).is_fatal());
        assert!(!TripError::Submission("retries".into()).is_fatal());
    }
}
