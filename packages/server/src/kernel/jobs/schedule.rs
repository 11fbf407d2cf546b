//! Cron schedules that emit jobs on a recurrence.
//!
//! Expressions are standard five-field cron (minute hour day-of-month month
//! day-of-week), evaluated in UTC. The `cron` crate wants a seconds field, so
//! a literal `0` is prepended before parsing; callers never see the six-field
//! form.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::error::JobError;

/// A persisted recurrence that the scheduler turns into jobs.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub cron_expr: String,
    pub max_attempts: i32,
    pub enabled: bool,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inputs for creating a schedule.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub name: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub cron_expr: String,
    pub max_attempts: i32,
    pub enabled: bool,
}

/// Partial update for a schedule. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub job_type: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub cron_expr: Option<String>,
    pub max_attempts: Option<i32>,
    pub enabled: Option<bool>,
}

/// Parse a five-field cron expression, rejecting anything else.
fn parse_cron(expr: &str) -> Result<cron::Schedule, JobError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(JobError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected 5 fields, got {}", fields.len()),
        });
    }

    let with_seconds = format!("0 {}", fields.join(" "));
    cron::Schedule::from_str(&with_seconds).map_err(|e| JobError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Validate a five-field cron expression.
pub fn validate_cron_expr(expr: &str) -> Result<(), JobError> {
    parse_cron(expr).map(|_| ())
}

/// The first occurrence strictly after `after`, in UTC.
///
/// Returns an error when the expression never fires again (the `cron` crate
/// bounds evaluation at year 2100).
pub fn next_occurrence(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, JobError> {
    let schedule = parse_cron(expr)?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| JobError::InvalidCron {
            expr: expr.to_string(),
            reason: "no future occurrence".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_standard_five_field_expressions() {
        for expr in ["* * * * *", "*/5 * * * *", "0 3 * * 1", "30 2 1 * *"] {
            assert!(validate_cron_expr(expr).is_ok(), "rejected {expr}");
        }
    }

    #[test]
    fn rejects_wrong_field_counts() {
        for expr in ["* * * *", "0 * * * * *", "0 0 * * * * 2030", ""] {
            assert!(
                matches!(validate_cron_expr(expr), Err(JobError::InvalidCron { .. })),
                "accepted {expr:?}"
            );
        }
    }

    #[test]
    fn rejects_garbage_fields() {
        assert!(matches!(
            validate_cron_expr("99 * * * *"),
            Err(JobError::InvalidCron { .. })
        ));
        assert!(matches!(
            validate_cron_expr("* * * * purple"),
            Err(JobError::InvalidCron { .. })
        ));
    }

    #[test]
    fn next_occurrence_is_strictly_in_the_future() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let next = next_occurrence("* * * * *", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap());
    }

    #[test]
    fn next_occurrence_honors_minute_steps() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 10).unwrap();
        let next = next_occurrence("*/5 * * * *", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn next_occurrence_skips_missed_fires() {
        // A nightly schedule queried days later lands on the next night,
        // not on the backlog of missed ones.
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let next = next_occurrence("0 2 * * *", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 11, 2, 0, 0).unwrap());
    }
}
