//! Delay schedules for retrying and polling remote services.
//!
//! [`BackoffConfig`] controls how transient HTTP errors (429, 5xx) on the
//! text-generation call are retried with increasing, jittered delays.
//! [`PollSchedule`] is the deterministic doubling cadence used while an
//! image job waits in the remote queue.

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
///
/// # Example
///
/// ```
/// use trip_pipeline::backend::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
///
/// let standard = BackoffConfig::standard();
/// assert_eq!(standard.max_retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of transport retries. Default: 0 (no retry).
    pub max_retries: u32,

    /// Initial delay before first retry. Default: 1 second.
    pub initial_delay: Duration,

    /// Multiplier applied to delay after each retry. Default: 2.0.
    pub multiplier: f64,

    /// Maximum delay between retries. Default: 60 seconds.
    pub max_delay: Duration,

    /// Jitter strategy. Default: Full.
    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger retry. Default: `[429, 500, 502, 503, 504]`.
    pub retryable_statuses: Vec<u16>,

    /// Whether to respect `Retry-After` headers from the provider.
    pub respect_retry_after: bool,

    /// Upper bound on a single attempt. `None` leaves it to the backend.
    pub attempt_timeout: Option<Duration>,
}

/// Jitter strategy to prevent thundering herd on shared rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter. Delay is exactly the calculated value.
    None,

    /// Full jitter: random value in `[0, calculated_delay]`.
    Full,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// Sensible defaults for cloud APIs: 3 retries, 1s initial, 2x multiplier,
    /// 60s max, full jitter, respects Retry-After.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
            attempt_timeout: None,
        }
    }

    /// Calculate the delay for attempt N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`. Jitter is then applied according to the configured strategy.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = exponential_secs(self.initial_delay, self.multiplier, attempt, self.max_delay);

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}

/// Doubling poll cadence for queued remote jobs.
///
/// `interval(n) = min(initial * 2^n, cap)`. Deterministic, so the sequence is
/// monotonically non-decreasing and never exceeds `cap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
    pub initial: Duration,
    pub cap: Duration,
    pub multiplier: f64,
}

impl PollSchedule {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap: cap.max(initial),
            multiplier: 2.0,
        }
    }

    /// Wait before poll number `attempt` (0-indexed).
    pub fn interval(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(exponential_secs(
            self.initial,
            self.multiplier,
            attempt,
            self.cap,
        ))
    }

    /// Sum of the first `attempts` intervals.
    pub fn total_for(&self, attempts: u32) -> Duration {
        (0..attempts).map(|n| self.interval(n)).sum()
    }
}

fn exponential_secs(initial: Duration, multiplier: f64, attempt: u32, cap: Duration) -> f64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = initial.as_secs_f64() * multiplier.powi(exponent);
    // powi overflows to +inf for large attempts; min() folds that into the cap.
    base.min(cap.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_exponential() {
        let config = BackoffConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: false,
            attempt_timeout: None,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_jitter_full_in_range() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Full,
            ..BackoffConfig::standard()
        };
        for _ in 0..100 {
            let d = config.delay_for_attempt(1);
            assert!(d <= Duration::from_secs(2), "delay {:?} > 2s", d);
        }
    }

    #[test]
    fn test_poll_schedule_doubles_then_caps() {
        let schedule = PollSchedule::new(Duration::from_secs(10), Duration::from_secs(120));
        assert_eq!(schedule.interval(0), Duration::from_secs(10));
        assert_eq!(schedule.interval(1), Duration::from_secs(20));
        assert_eq!(schedule.interval(2), Duration::from_secs(40));
        assert_eq!(schedule.interval(3), Duration::from_secs(80));
        assert_eq!(schedule.interval(4), Duration::from_secs(120));
        assert_eq!(schedule.interval(19), Duration::from_secs(120));
    }

    #[test]
    fn test_poll_schedule_monotonic_and_capped() {
        let schedule = PollSchedule::new(Duration::from_millis(750), Duration::from_secs(90));
        let mut previous = Duration::ZERO;
        for n in 0..200 {
            let current = schedule.interval(n);
            assert!(current >= previous, "interval({}) shrank", n);
            assert!(current <= schedule.cap, "interval({}) above cap", n);
            previous = current;
        }
        assert_eq!(schedule.interval(u32::MAX), schedule.cap);
    }

    #[test]
    fn test_poll_schedule_cap_never_below_initial() {
        let schedule = PollSchedule::new(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(schedule.cap, Duration::from_secs(30));
        assert_eq!(schedule.interval(3), Duration::from_secs(30));
    }

    #[test]
    fn test_poll_schedule_total() {
        let schedule = PollSchedule::new(Duration::from_secs(10), Duration::from_secs(120));
        assert_eq!(schedule.total_for(3), Duration::from_secs(70));
        assert_eq!(schedule.total_for(0), Duration::ZERO);
    }
}
