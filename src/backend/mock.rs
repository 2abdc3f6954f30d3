//! Scripted collaborators for testing without live services.
//!
//! Each mock replays a list of [`MockReply`] values in order, which lets
//! downstream code write deterministic tests for rate limits, faults and
//! slow lookups.
//!
//! # Example
//!
//! ```
//! use trip_pipeline::backend::{MockGeocoder, MockTextBackend};
//!
//! let text = MockTextBackend::fixed("Day 1:\nFrom Paris to Lyon");
//! let geo = MockGeocoder::new().with_place("Paris", 48.8566, 2.3522);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GeoMatch, Geocoder, ImageCheck, ImageRequest, ImageService, TextGeneration};
use crate::error::{Result, RATE_LIMIT_STATUS};
use crate::TripError;

/// One scripted answer from a mock collaborator.
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Ok(T),
    /// HTTP 429 with an optional `Retry-After`.
    RateLimited(Option<Duration>),
    /// A non-retryable failure.
    Fail(String),
    /// Never answers; exercises timeouts and cancellation.
    Hang,
}

impl<T: Clone> MockReply<T> {
    async fn resolve(self) -> Result<T> {
        match self {
            MockReply::Ok(value) => Ok(value),
            MockReply::RateLimited(retry_after) => Err(TripError::HttpError {
                status: RATE_LIMIT_STATUS,
                body: "rate limited".to_string(),
                retry_after,
            }),
            MockReply::Fail(message) => Err(TripError::Other(message)),
            MockReply::Hang => {
                std::future::pending::<()>().await;
                Err(TripError::Other("unreachable".to_string()))
            }
        }
    }
}

/// Replays replies in order; the last reply repeats once the script runs out.
#[derive(Debug)]
struct Script<T> {
    replies: Mutex<VecDeque<MockReply<T>>>,
    last: Mutex<Option<MockReply<T>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(replies: Vec<MockReply<T>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self, fallback: impl FnOnce() -> MockReply<T>) -> MockReply<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let popped = self
            .replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        match popped {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last.clone().unwrap_or_else(fallback),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

/// A text backend that returns canned completions in order.
#[derive(Debug)]
pub struct MockTextBackend {
    script: Script<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockTextBackend {
    pub fn scripted(replies: Vec<MockReply<String>>) -> Self {
        Self {
            script: Script::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same text.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::scripted(vec![MockReply::Ok(text.into())])
    }

    /// Always fail with a non-retryable error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::scripted(vec![MockReply::Fail(message.into())])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl TextGeneration for MockTextBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());
        self.script
            .next(|| MockReply::Ok(String::new()))
            .resolve()
            .await
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// A geocoder backed by a fixed table of places.
///
/// Unknown places return no matches. Lookups can be delayed per place to
/// exercise out-of-order completion.
#[derive(Debug, Default)]
pub struct MockGeocoder {
    places: HashMap<String, GeoMatch>,
    delays: HashMap<String, Duration>,
    failing: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(place: &str) -> String {
        place.trim().to_lowercase()
    }

    pub fn with_place(mut self, place: &str, lat: f64, lng: f64) -> Self {
        self.places.insert(
            Self::key(place),
            GeoMatch {
                lat,
                lng,
                display_name: Some(place.to_string()),
            },
        );
        self
    }

    /// Delay the answer for `place` by `delay`.
    pub fn with_delay(mut self, place: &str, delay: Duration) -> Self {
        self.delays.insert(Self::key(place), delay);
        self
    }

    /// Make lookups for `place` fail with a transport-style error.
    pub fn with_failure(mut self, place: &str, message: &str) -> Self {
        self.failing.insert(Self::key(place), message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn search(&self, place: &str, _country: &str) -> Result<Vec<GeoMatch>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let key = Self::key(place);
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failing.get(&key) {
            return Err(TripError::Other(message.clone()));
        }
        Ok(self.places.get(&key).cloned().into_iter().collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// An image service that replays scripted submit and check replies.
///
/// When the check script runs out, the last reply repeats; with no check
/// script at all the job stays queued forever.
#[derive(Debug)]
pub struct MockImageService {
    submits: Script<String>,
    checks: Script<ImageCheck>,
    requests: Mutex<Vec<ImageRequest>>,
}

impl MockImageService {
    pub fn new(submits: Vec<MockReply<String>>, checks: Vec<MockReply<ImageCheck>>) -> Self {
        Self {
            submits: Script::new(submits),
            checks: Script::new(checks),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Accept the job as `id` and finish it with `url` on the first poll.
    pub fn completing(id: &str, url: &str) -> Self {
        Self::new(
            vec![MockReply::Ok(id.to_string())],
            vec![MockReply::Ok(ImageCheck::finished([url]))],
        )
    }

    pub fn submit_calls(&self) -> usize {
        self.submits.calls()
    }

    pub fn check_calls(&self) -> usize {
        self.checks.calls()
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl ImageService for MockImageService {
    async fn submit(&self, request: &ImageRequest) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());
        self.submits
            .next(|| MockReply::Fail("no scripted submission".to_string()))
            .resolve()
            .await
    }

    async fn check(&self, _id: &str) -> Result<ImageCheck> {
        self.checks
            .next(|| MockReply::Ok(ImageCheck::waiting(1, 60)))
            .resolve()
            .await
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
