//! Collaborator traits and the HTTP adapters that implement them.
//!
//! Each external service sits behind its own object-safe trait so the
//! pipeline can be wired with real clients or scripted fakes:
//!
//! ```text
//!                    ┌──────────────► TextGeneration ──► OpenAiTextBackend  /v1/chat/completions
//!                    │                                   OllamaTextBackend  /api/generate
//! PipelineCoordinator├──────────────► Geocoder ────────► NominatimGeocoder  /search
//!                    │
//!                    └──────────────► ImageService ────► HordeImageService  /generate/async
//!                                                                           /generate/check/{id}
//!                                                                           /generate/status/{id}
//! ```
//!
//! Adapters own their `reqwest::Client`, base URL and credentials.

pub mod backoff;
pub mod horde;
pub mod mock;
pub mod nominatim;
pub mod ollama;
pub mod openai;

pub use backoff::{BackoffConfig, PollSchedule};
pub use horde::HordeImageService;
pub use mock::{MockGeocoder, MockImageService, MockReply, MockTextBackend};
pub use nominatim::NominatimGeocoder;
pub use ollama::OllamaTextBackend;
pub use openai::OpenAiTextBackend;

use crate::error::Result;
use crate::events::{emit, Event, EventHandler};
use crate::TripError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// A text-generation provider: prompt in, free text out.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    /// Request a single completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// One candidate returned by a geocoding lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMatch {
    pub lat: f64,
    pub lng: f64,
    pub display_name: Option<String>,
}

/// A place-name search service.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Search for `place` within `country`. An empty list means no match.
    async fn search(&self, place: &str, country: &str) -> Result<Vec<GeoMatch>>;

    fn name(&self) -> &'static str;
}

/// Parameters for one image-generation submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub samples: u32,
    pub steps: u32,
    pub nsfw: bool,
    pub censor_nsfw: bool,
    pub trusted_workers: bool,
}

impl ImageRequest {
    pub fn from_config(prompt: impl Into<String>, config: &crate::config::ImageConfig) -> Self {
        Self {
            prompt: prompt.into(),
            samples: config.samples,
            steps: config.steps,
            nsfw: config.nsfw,
            censor_nsfw: config.censor_nsfw,
            trusted_workers: config.trusted_workers,
        }
    }
}

/// A finished image reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub url: String,
}

/// Normalized status of a remote image job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageCheck {
    pub done: bool,
    pub faulted: bool,
    /// A worker has picked the job up.
    pub processing: bool,
    pub queue_position: Option<u32>,
    pub wait_time_seconds: Option<u32>,
    /// Populated once `done`; may legitimately be empty on a broken remote.
    pub results: Vec<GeneratedImage>,
}

impl ImageCheck {
    /// Still in the queue, not picked up yet.
    pub fn waiting(queue_position: u32, wait_time_seconds: u32) -> Self {
        Self {
            queue_position: Some(queue_position),
            wait_time_seconds: Some(wait_time_seconds),
            ..Self::default()
        }
    }

    /// A worker is generating.
    pub fn processing(wait_time_seconds: u32) -> Self {
        Self {
            processing: true,
            queue_position: Some(0),
            wait_time_seconds: Some(wait_time_seconds),
            ..Self::default()
        }
    }

    /// Done, with the given result URLs.
    pub fn finished<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            done: true,
            results: urls
                .into_iter()
                .map(|u| GeneratedImage { url: u.into() })
                .collect(),
            ..Self::default()
        }
    }

    pub fn faulted() -> Self {
        Self {
            faulted: true,
            ..Self::default()
        }
    }
}

/// An asynchronous image-generation service.
///
/// A rate-limit response is reported as [`TripError::HttpError`] with status
/// 429 and the parsed `Retry-After` delay.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Submit a job and return its remote id.
    async fn submit(&self, request: &ImageRequest) -> Result<String>;

    /// Fetch the current status of job `id`.
    async fn check(&self, id: &str) -> Result<ImageCheck>;

    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value as seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Turn a non-success response into [`TripError::HttpError`].
pub(crate) async fn http_error(resp: reqwest::Response) -> TripError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();
    TripError::HttpError {
        status,
        body,
        retry_after,
    }
}

/// Check whether a [`TripError`] is retryable based on the backoff config.
///
/// Retryable conditions:
/// - [`TripError::HttpError`] with a status in `config.retryable_statuses`
/// - [`TripError::Request`] (connection/transport errors)
pub fn is_retryable(error: &TripError, config: &BackoffConfig) -> bool {
    match error {
        TripError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        TripError::Request(_) => true,
        _ => false,
    }
}

/// Execute a completion call with transport-level retry and exponential backoff.
///
/// Returns the first successful response, or the last error if all retries
/// are exhausted. Sleeps between attempts race against `cancel`, so a
/// cancelled request never waits out its backoff.
pub async fn with_backoff(
    backend: &Arc<dyn TextGeneration>,
    prompt: &str,
    config: &BackoffConfig,
    cancel: Option<&CancellationToken>,
    events: &Option<Arc<dyn EventHandler>>,
    mut on_retry: RetryCallback<'_>,
) -> Result<String> {
    let mut last_error: Option<TripError> = None;

    for attempt in 0..=config.max_retries {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(TripError::Cancelled);
        }

        if attempt > 0 {
            let delay = match last_error.as_ref().and_then(TripError::retry_after) {
                Some(ra) if config.respect_retry_after => ra,
                _ => config.delay_for_attempt(attempt - 1),
            };

            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();

            warn!(
                backend = backend.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "retrying text generation"
            );
            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }
            emit(
                events,
                Event::TransportRetry {
                    name: backend.name().to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason,
                },
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(TripError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }

        match bounded_attempt(backend, prompt, config.attempt_timeout, cancel).await {
            Ok(text) => {
                debug!(backend = backend.name(), attempt, chars = text.len(), "completion received");
                return Ok(text);
            }
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or(TripError::Other(
        "backoff loop exited unexpectedly".into(),
    )))
}

/// One completion call, raced against `cancel` and capped at `limit`.
async fn bounded_attempt(
    backend: &Arc<dyn TextGeneration>,
    prompt: &str,
    limit: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<String> {
    let call = async {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, backend.complete(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(TripError::Generation(format!(
                    "{} did not answer within {:?}",
                    backend.name(),
                    limit
                ))),
            },
            None => backend.complete(prompt).await,
        }
    };
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => Err(TripError::Cancelled),
                result = call => result,
            }
        }
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, retry_after: Option<Duration>) -> TripError {
        TripError::HttpError {
            status,
            body: String::new(),
            retry_after,
        }
    }

    #[test]
    fn test_is_retryable_statuses() {
        let config = BackoffConfig::standard();
        assert!(is_retryable(&http(429, None), &config));
        assert!(is_retryable(&http(503, None), &config));
        assert!(!is_retryable(&http(400, None), &config));
        assert!(!is_retryable(&TripError::Other("x".into()), &config));
        assert!(!is_retryable(&TripError::Cancelled, &config));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_retries_then_succeeds() {
        let backend: Arc<dyn TextGeneration> = Arc::new(MockTextBackend::scripted(vec![
            MockReply::RateLimited(Some(Duration::from_secs(3))),
            MockReply::Ok("Day 1:\nFrom A to B".to_string()),
        ]));
        let mut retries = Vec::new();
        let mut on_retry = |attempt: u32, delay: Duration, _: &str| retries.push((attempt, delay));

        let started = tokio::time::Instant::now();
        let text = with_backoff(
            &backend,
            "prompt",
            &BackoffConfig::standard(),
            None,
            &None,
            Some(&mut on_retry),
        )
        .await
        .unwrap();

        assert_eq!(text, "Day 1:\nFrom A to B");
        assert_eq!(retries, vec![(1, Duration::from_secs(3))]);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_backoff_gives_up_on_non_retryable() {
        let backend: Arc<dyn TextGeneration> = Arc::new(MockTextBackend::scripted(vec![
            MockReply::Fail("bad request".to_string()),
            MockReply::Ok("never reached".to_string()),
        ]));
        let result = with_backoff(
            &backend,
            "prompt",
            &BackoffConfig::standard(),
            None,
            &None,
            None,
        )
        .await;
        assert!(matches!(result, Err(TripError::Other(_))));
    }

    #[tokio::test]
    async fn test_backoff_respects_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let backend: Arc<dyn TextGeneration> = Arc::new(MockTextBackend::fixed("text"));
        let result = with_backoff(
            &backend,
            "prompt",
            &BackoffConfig::standard(),
            Some(&token),
            &None,
            None,
        )
        .await;
        assert!(matches!(result, Err(TripError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_not_retried() {
        let mock = Arc::new(MockTextBackend::scripted(vec![MockReply::Hang]));
        let backend: Arc<dyn TextGeneration> = mock.clone();
        let config = BackoffConfig {
            attempt_timeout: Some(Duration::from_secs(5)),
            ..BackoffConfig::standard()
        };

        let started = tokio::time::Instant::now();
        let result = with_backoff(&backend, "prompt", &config, None, &None, None).await;

        assert!(matches!(result, Err(TripError::Generation(_))));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(mock.calls(), 1);
    }
}
