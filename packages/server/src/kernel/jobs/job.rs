//! Job model for background work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Lifecycle state of a job.
///
/// `queued → running → completed`, or back to `queued` on a retryable failure,
/// or `failed` once the retry budget is spent. `canceled` is reachable from
/// `queued` only. The three terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "canceled" => Ok(JobState::Canceled),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// A persisted unit of background work.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
    pub idempotency_key: Option<String>,
    pub schedule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether a worker holding `worker_id` still owns this job.
    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.state == JobState::Running && self.worker_id.as_deref() == Some(worker_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Enqueue-time inputs for a new job.
///
/// `max_attempts` and `run_at` fall back to the handler default and the
/// current instant when omitted.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewJob {
    pub job_type: String,
    /// Defaults to an empty object so typed handler payloads with no fields
    /// still decode.
    #[builder(default = serde_json::Value::Object(serde_json::Map::new()))]
    pub payload: serde_json::Value,
    #[builder(default, setter(strip_option))]
    pub max_attempts: Option<i32>,
    #[builder(default, setter(strip_option))]
    pub run_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub idempotency_key: Option<String>,
    #[builder(default, setter(strip_option))]
    pub schedule_id: Option<Uuid>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self::builder().job_type(job_type).build()
    }

    pub fn with_payload(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::builder().job_type(job_type).payload(payload).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Canceled.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in [
            JobState::Queued,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
            JobState::Canceled,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
    }

    #[test]
    fn state_serializes_lower_case() {
        assert_eq!(
            serde_json::to_string(&JobState::Canceled).unwrap(),
            "\"canceled\""
        );
    }

    #[test]
    fn new_job_defaults() {
        let job = NewJob::new("noop");
        assert_eq!(job.job_type, "noop");
        assert_eq!(job.payload, serde_json::json!({}));
        assert!(job.max_attempts.is_none());
        assert!(job.run_at.is_none());
        assert!(job.idempotency_key.is_none());
        assert!(job.schedule_id.is_none());
    }
}
