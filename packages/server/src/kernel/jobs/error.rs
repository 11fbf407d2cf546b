//! Error taxonomy for the jobs subsystem.

use thiserror::Error;
use uuid::Uuid;

use super::job::JobState;

/// Errors surfaced by the job store and service facade.
///
/// Handler execution errors are not represented here; they are captured into
/// the job's `last_error` column and drive the retry machinery instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("duplicate schedule name: {0}")]
    DuplicateScheduleName(String),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("schedule {0} not found")]
    ScheduleNotFound(Uuid),

    #[error("job is {state} and cannot be canceled")]
    NotCancelable { state: JobState },

    #[error("job is {state} and cannot be retried")]
    NotRetryable { state: JobState },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl JobError {
    /// Whether the error indicates bad caller input rather than system state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            JobError::UnknownJobType(_) | JobError::Validation(_) | JobError::InvalidCron { .. }
        )
    }
}

pub type JobResult<T> = Result<T, JobError>;
