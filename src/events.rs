//! Event system for pipeline lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe a trip request.
//! The coordinator, resolver and image orchestrator emit events when stages
//! start and finish, when a place is geocoded, and on every image-job
//! transition. Implement [`EventHandler`] to receive them for progress
//! tracking or UIs; structured logs go through `tracing` regardless.

use crate::image_job::JobState;
use std::sync::Arc;

/// Pipeline stage, for [`Event::StageStart`] / [`Event::StageEnd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TextGeneration,
    Parsing,
    Geocoding,
    Image,
}

/// Which phase of the image job hit a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Submission,
    Polling,
}

/// Events emitted while a trip request is processed.
#[derive(Debug, Clone)]
pub enum Event {
    /// A pipeline stage has started.
    StageStart { stage: Stage },
    /// A pipeline stage has finished.
    StageEnd {
        stage: Stage,
        /// Whether the stage succeeded (degraded stages report `false`).
        ok: bool,
    },
    /// A transport-level retry of the text-generation call.
    TransportRetry {
        /// Backend name.
        name: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Reason for the retry (error description).
        reason: String,
    },
    /// A place lookup finished.
    Geocoded {
        /// 1-based route index the place belongs to.
        index: usize,
        place: String,
        resolved: bool,
    },
    /// The image job changed state.
    JobTransition {
        /// Remote job id, once assigned.
        id: Option<String>,
        from: JobState,
        to: JobState,
    },
    /// The image service asked us to back off.
    RateLimited { phase: JobPhase, delay_ms: u64 },
    /// A status poll returned a not-yet-done answer.
    Polled {
        attempt: u32,
        queue_position: Option<u32>,
        wait_time_seconds: Option<u32>,
    },
}

/// Handler for pipeline lifecycle events.
///
/// This is entirely optional -- the pipeline works without an event handler.
///
/// # Example
///
/// ```
/// use trip_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::JobTransition { from, to, .. } => println!("[image] {:?} -> {:?}", from, to),
///             Event::Geocoded { place, resolved, .. } => println!("[geo] {} {}", place, resolved),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the pipeline emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use trip_pipeline::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Polled { attempt, queue_position, .. } = event {
///         println!("poll {} queue {:?}", attempt, queue_position);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_without_handler_is_noop() {
        emit(&None, Event::StageStart { stage: Stage::Parsing });
    }

    #[test]
    fn test_fn_handler_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Option<Arc<dyn EventHandler>> =
            Some(Arc::new(FnEventHandler(move |event: Event| {
                if let Event::StageEnd { stage, ok } = event {
                    sink.lock().unwrap().push((stage, ok));
                }
            })));

        emit(&handler, Event::StageStart { stage: Stage::Geocoding });
        emit(&handler, Event::StageEnd { stage: Stage::Geocoding, ok: true });

        assert_eq!(*seen.lock().unwrap(), vec![(Stage::Geocoding, true)]);
    }
}
