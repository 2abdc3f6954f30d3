//! Driving an asynchronous image-generation job to a terminal state.
//!
//! [`ImageJobOrchestrator`] owns one [`ImageJob`] and walks it through the
//! [`JobState`] machine: a rate-limit-aware submission loop, then a polling
//! loop on a [`PollSchedule`](crate::backend::PollSchedule). Every loop is
//! bounded (submission retries, poll attempts, rate-limit waits and an
//! aggregate time budget) and every sleep races the cancellation token.
//!
//! Failures never escape as errors; they end the job in `Failed`, `Errored`
//! or `Abandoned` with a `failure` description. Use
//! [`ImageJob::outcome`] to view the result as a `Result`.

pub mod state;

pub use state::{ImageJob, JobState};

use crate::backend::{ImageCheck, ImageRequest, ImageService};
use crate::config::ImageConfig;
use crate::error::Result;
use crate::events::{emit, Event, EventHandler, JobPhase};
use crate::TripError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a guarded remote call ended.
enum CallOutcome<T> {
    Done(Result<T>),
    TimedOut,
    Cancelled,
}

pub struct ImageJobOrchestrator {
    service: Arc<dyn ImageService>,
    config: ImageConfig,
    job: ImageJob,
    events: Option<Arc<dyn EventHandler>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ImageJobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageJobOrchestrator")
            .field("service", &self.service.name())
            .field("job", &self.job)
            .finish_non_exhaustive()
    }
}

impl ImageJobOrchestrator {
    pub fn new(service: Arc<dyn ImageService>, config: ImageConfig) -> Self {
        Self {
            service,
            config,
            job: ImageJob::new(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach to a job submitted earlier, e.g. for a status check.
    pub fn resume(service: Arc<dyn ImageService>, config: ImageConfig, id: impl Into<String>) -> Self {
        let mut orchestrator = Self::new(service, config);
        orchestrator.job = ImageJob::resumed(id);
        orchestrator
    }

    pub fn with_events(mut self, handler: Option<Arc<dyn EventHandler>>) -> Self {
        self.events = handler;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn job(&self) -> &ImageJob {
        &self.job
    }

    pub fn into_job(self) -> ImageJob {
        self.job
    }

    /// `Idle -> Submitting`. Returns `false` if the job was already started.
    pub fn initiate(&mut self) -> bool {
        self.move_to(JobState::Submitting)
    }

    /// Submit `request` and poll until the job is terminal.
    ///
    /// Only the first call does anything; later calls return the job as-is.
    pub async fn run(&mut self, request: &ImageRequest) -> ImageJob {
        if !self.initiate() {
            debug!(state = %self.job.state(), "image job already started, not resubmitting");
            return self.job.clone();
        }
        if self.submit(request).await {
            self.poll().await;
        }
        info!(
            id = self.job.id().unwrap_or("-"),
            state = %self.job.state(),
            attempts = self.job.attempt,
            submission_retries = self.job.submission_retries,
            "image job finished"
        );
        self.job.clone()
    }

    /// Perform a single status poll and apply it.
    ///
    /// Errors (including rate limits and timeouts) are returned as-is and
    /// leave the job untouched.
    pub async fn check_once(&mut self) -> Result<&ImageJob> {
        if self.job.state().is_terminal() {
            return Ok(&self.job);
        }
        let Some(id) = self.job.id().map(str::to_string) else {
            return Err(TripError::Other("image job has no id yet".into()));
        };
        match self.guarded(self.service.check(&id)).await {
            CallOutcome::Done(Ok(check)) => {
                self.job.attempt += 1;
                self.apply_check(check);
                Ok(&self.job)
            }
            CallOutcome::Done(Err(e)) => Err(e),
            CallOutcome::TimedOut => Err(TripError::Other(format!(
                "status check timed out after {:?}",
                self.config.request_timeout()
            ))),
            CallOutcome::Cancelled => Err(TripError::Cancelled),
        }
    }

    fn move_to(&mut self, next: JobState) -> bool {
        let from = self.job.state();
        if !self.job.transition(next) {
            return false;
        }
        debug!(id = self.job.id().unwrap_or("-"), %from, to = %next, "image job transition");
        emit(
            &self.events,
            Event::JobTransition {
                id: self.job.id().map(str::to_string),
                from,
                to: next,
            },
        );
        true
    }

    fn finish(&mut self, state: JobState, failure: impl Into<String>) {
        let failure = failure.into();
        warn!(id = self.job.id().unwrap_or("-"), to = %state, %failure, "image job did not complete");
        self.job.failure = Some(failure);
        self.move_to(state);
    }

    fn abandon_cancelled(&mut self) {
        self.job.mark_cancelled();
        self.finish(JobState::Abandoned, "cancelled");
    }

    /// Run a remote call under the per-call timeout, racing cancellation.
    async fn guarded<T>(&self, call: impl Future<Output = Result<T>>) -> CallOutcome<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => CallOutcome::Cancelled,
            res = tokio::time::timeout(self.config.request_timeout(), call) => match res {
                Ok(res) => CallOutcome::Done(res),
                Err(_) => CallOutcome::TimedOut,
            },
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn rate_limited(&self, phase: JobPhase, delay: Duration) {
        debug!(?phase, delay_ms = delay.as_millis() as u64, "image service rate limited");
        emit(
            &self.events,
            Event::RateLimited {
                phase,
                delay_ms: delay.as_millis() as u64,
            },
        );
    }

    /// Submission loop. Returns `true` once the job is `Queued`.
    async fn submit(&mut self, request: &ImageRequest) -> bool {
        loop {
            match self.guarded(self.service.submit(request)).await {
                CallOutcome::Done(Ok(id)) => {
                    self.job.assign_id(id);
                    info!(
                        service = self.service.name(),
                        id = self.job.id().unwrap_or("-"),
                        retries = self.job.submission_retries,
                        "image job submitted"
                    );
                    return self.move_to(JobState::Queued);
                }
                CallOutcome::Done(Err(e)) if e.is_rate_limit() => {
                    if self.job.submission_retries >= self.config.max_submission_retries {
                        self.finish(
                            JobState::Errored,
                            format!(
                                "still rate limited after {} submission retries",
                                self.job.submission_retries
                            ),
                        );
                        return false;
                    }
                    self.job.submission_retries += 1;
                    let delay = e.retry_after().unwrap_or_else(|| self.config.default_retry_after());
                    self.rate_limited(JobPhase::Submission, delay);
                    self.move_to(JobState::Submitting);
                    if !self.sleep_or_cancel(delay).await {
                        self.abandon_cancelled();
                        return false;
                    }
                }
                CallOutcome::Done(Err(e)) => {
                    self.finish(JobState::Errored, e.to_string());
                    return false;
                }
                CallOutcome::TimedOut => {
                    self.finish(
                        JobState::Errored,
                        format!("submission timed out after {:?}", self.config.request_timeout()),
                    );
                    return false;
                }
                CallOutcome::Cancelled => {
                    self.abandon_cancelled();
                    return false;
                }
            }
        }
    }

    /// Polling loop. Ends with the job in a terminal state.
    async fn poll(&mut self) {
        let Some(id) = self.job.id().map(str::to_string) else {
            self.finish(JobState::Errored, "no job id to poll");
            return;
        };
        let schedule = self.config.poll_schedule();
        let budget = self.config.total_budget();
        let started = Instant::now();
        let mut next_delay = schedule.interval(0);
        let mut rate_limit_waits = 0u32;

        loop {
            if self.job.attempt >= self.config.max_poll_attempts {
                let msg = format!("no result after {} status polls", self.job.attempt);
                self.finish(JobState::Abandoned, msg);
                return;
            }
            if started.elapsed() + next_delay > budget {
                let msg = format!("time budget of {:?} exhausted", budget);
                self.finish(JobState::Abandoned, msg);
                return;
            }
            if !self.sleep_or_cancel(next_delay).await {
                self.abandon_cancelled();
                return;
            }

            match self.guarded(self.service.check(&id)).await {
                CallOutcome::Done(Ok(check)) => {
                    self.job.attempt += 1;
                    if self.apply_check(check) {
                        return;
                    }
                    next_delay = schedule.interval(self.job.attempt);
                }
                CallOutcome::Done(Err(e)) if e.is_rate_limit() => {
                    rate_limit_waits += 1;
                    if rate_limit_waits > self.config.max_rate_limit_waits {
                        let msg = format!("rate limited {} times while polling", rate_limit_waits - 1);
                        self.finish(JobState::Abandoned, msg);
                        return;
                    }
                    next_delay = e.retry_after().unwrap_or_else(|| self.config.default_retry_after());
                    self.rate_limited(JobPhase::Polling, next_delay);
                }
                CallOutcome::Done(Err(e)) => {
                    self.job.attempt += 1;
                    warn!(%id, attempt = self.job.attempt, error = %e, "status poll failed");
                    next_delay = schedule.interval(self.job.attempt);
                }
                CallOutcome::TimedOut => {
                    self.job.attempt += 1;
                    warn!(%id, attempt = self.job.attempt, "status poll timed out");
                    next_delay = schedule.interval(self.job.attempt);
                }
                CallOutcome::Cancelled => {
                    self.abandon_cancelled();
                    return;
                }
            }
        }
    }

    /// Apply one status answer. Returns `true` if the job is now terminal.
    fn apply_check(&mut self, check: ImageCheck) -> bool {
        if check.faulted {
            self.finish(JobState::Failed, "image service reported the job as faulted");
            return true;
        }
        if check.done {
            return match check.results.into_iter().next() {
                Some(image) => {
                    self.job.url = Some(image.url);
                    self.move_to(JobState::Completed)
                }
                None => {
                    self.finish(JobState::Errored, "job finished without any images");
                    true
                }
            };
        }

        self.job.queue_position = check.queue_position;
        self.job.wait_time_seconds = check.wait_time_seconds;
        let queued = check.queue_position.unwrap_or(0) > 0 || !check.processing;
        let next = if queued {
            JobState::Queued
        } else {
            JobState::Generating
        };
        if next != self.job.state() {
            self.move_to(next);
        }
        emit(
            &self.events,
            Event::Polled {
                attempt: self.job.attempt,
                queue_position: check.queue_position,
                wait_time_seconds: check.wait_time_seconds,
            },
        );
        false
    }
}
