//! Image-job states and the job record they live in.

use crate::error::{Result, TripError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one remote image-generation job.
///
/// ```text
/// Idle ─► Submitting ─┬─► Queued ◄─► Generating ─┬─► Completed
///            ▲  │     │                          ├─► Failed
///            └──┘     └─► Errored ◄──────────────┼─► Errored
///        (rate limit)                            └─► Abandoned
/// ```
///
/// `Completed`, `Failed`, `Errored` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Submitting,
    Queued,
    Generating,
    Completed,
    Failed,
    Errored,
    Abandoned,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Errored | JobState::Abandoned
        )
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match self {
            Idle => next == Submitting,
            Submitting => matches!(next, Submitting | Queued | Errored | Abandoned),
            Queued | Generating => matches!(
                next,
                Queued | Generating | Completed | Failed | Errored | Abandoned
            ),
            Completed | Failed | Errored | Abandoned => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Submitting => "submitting",
            JobState::Queued => "queued",
            JobState::Generating => "generating",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Errored => "errored",
            JobState::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about an image job during one request.
///
/// `id` and `state` are private: the id can be assigned once, and the state
/// only changes through [`transition`](Self::transition).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageJob {
    id: Option<String>,
    state: JobState,
    pub queue_position: Option<u32>,
    pub wait_time_seconds: Option<u32>,
    /// Status polls that counted against the attempt budget.
    pub attempt: u32,
    /// Rate-limited submission attempts that were retried.
    pub submission_retries: u32,
    pub url: Option<String>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    cancelled: bool,
}

impl Default for ImageJob {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageJob {
    pub fn new() -> Self {
        Self {
            id: None,
            state: JobState::Idle,
            queue_position: None,
            wait_time_seconds: None,
            attempt: 0,
            submission_retries: 0,
            url: None,
            failure: None,
            created_at: Utc::now(),
            cancelled: false,
        }
    }

    /// A job that was submitted elsewhere and is known only by its id.
    pub fn resumed(id: impl Into<String>) -> Self {
        let mut job = Self::new();
        job.id = Some(id.into());
        job.state = JobState::Queued;
        job
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Set the remote id. Returns `false` (and changes nothing) if one is
    /// already set.
    pub fn assign_id(&mut self, id: impl Into<String>) -> bool {
        if self.id.is_some() {
            return false;
        }
        self.id = Some(id.into());
        true
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// The terminal result as a `Result`: the image URL, or the error the
    /// job was absorbed into.
    pub fn outcome(&self) -> Result<&str> {
        let reason = || self.failure.clone().unwrap_or_else(|| self.state.to_string());
        match self.state {
            JobState::Completed => self
                .url
                .as_deref()
                .ok_or_else(|| TripError::Other("completed job has no url".into())),
            JobState::Failed => Err(TripError::RemoteFault(reason())),
            JobState::Errored if self.id.is_none() => Err(TripError::Submission(reason())),
            JobState::Errored => Err(TripError::Other(reason())),
            JobState::Abandoned if self.cancelled => Err(TripError::Cancelled),
            JobState::Abandoned => Err(TripError::PollTimeout(reason())),
            state => Err(TripError::Other(format!("job is still {}", state))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 8] = [
        JobState::Idle,
        JobState::Submitting,
        JobState::Queued,
        JobState::Generating,
        JobState::Completed,
        JobState::Failed,
        JobState::Errored,
        JobState::Abandoned,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_idle_only_goes_to_submitting() {
        let exits: Vec<JobState> = ALL
            .into_iter()
            .filter(|s| JobState::Idle.can_transition_to(*s))
            .collect();
        assert_eq!(exits, vec![JobState::Submitting]);
    }

    #[test]
    fn test_submitting_cannot_complete_directly() {
        assert!(!JobState::Submitting.can_transition_to(JobState::Completed));
        assert!(!JobState::Submitting.can_transition_to(JobState::Failed));
        assert!(JobState::Submitting.can_transition_to(JobState::Submitting));
    }

    #[test]
    fn test_transition_ignores_illegal_moves() {
        let mut job = ImageJob::new();
        assert!(!job.transition(JobState::Queued));
        assert_eq!(job.state(), JobState::Idle);

        assert!(job.transition(JobState::Submitting));
        assert!(job.transition(JobState::Queued));
        assert!(job.transition(JobState::Completed));
        assert!(!job.transition(JobState::Queued));
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn test_id_assigned_once() {
        let mut job = ImageJob::new();
        assert!(job.assign_id("abc"));
        assert!(!job.assign_id("def"));
        assert_eq!(job.id(), Some("abc"));
    }

    #[test]
    fn test_outcome_maps_terminal_states() {
        let mut job = ImageJob::resumed("x");
        job.failure = Some("worker crashed".into());
        job.transition(JobState::Failed);
        assert!(matches!(job.outcome(), Err(TripError::RemoteFault(m)) if m == "worker crashed"));

        let mut job = ImageJob::new();
        job.transition(JobState::Submitting);
        job.transition(JobState::Errored);
        assert!(matches!(job.outcome(), Err(TripError::Submission(_))));

        let mut job = ImageJob::resumed("y");
        job.transition(JobState::Abandoned);
        assert!(matches!(job.outcome(), Err(TripError::PollTimeout(_))));
        job.mark_cancelled();
        assert!(matches!(job.outcome(), Err(TripError::Cancelled)));
    }

    #[test]
    fn test_serializes_camel_case() {
        let job = ImageJob::resumed("job-1");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["id"], "job-1");
        assert_eq!(value["state"], "queued");
        assert_eq!(value["submissionRetries"], 0);
        assert!(value.get("createdAt").is_some());
        assert!(value.get("cancelled").is_none());
    }
}
