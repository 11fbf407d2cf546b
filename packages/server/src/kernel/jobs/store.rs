//! Transactional persistence for jobs and schedules.
//!
//! Every coordination primitive the queue relies on lives here: single-row
//! claims under `FOR UPDATE SKIP LOCKED`, conditional lease renewal, the
//! retry/terminal failure split, stalled-lease recovery, and the row-locked
//! schedule advance that de-duplicates emissions across processes.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::backoff::Backoff;
use super::error::{JobError, JobResult};
use super::job::{Job, JobState, NewJob};
use super::registry::SharedJobRegistry;
use super::schedule::{next_occurrence, validate_cron_expr, NewSchedule, Schedule, ScheduleUpdate};
use crate::common::pagination::Page;

/// Handler error text is truncated to this many bytes before persisting.
const MAX_ERROR_BYTES: usize = 64 * 1024;

/// Synthetic error recorded when the recovery sweep resets an expired lease.
const LEASE_EXPIRED_ERROR: &str = "lease expired";

const JOBS_IDEMPOTENCY_INDEX: &str = "jobs_idempotency_key_idx";
const SCHEDULES_NAME_KEY: &str = "schedules_name_key";

/// Outcome of an owner-scoped mutation (renew, complete, permanent fail).
///
/// `Stale` means the row was no longer `running` under the caller's worker id;
/// some other actor (the sweep, a competing process) has moved it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Stale,
}

/// Outcome of recording a handler failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-queued for another attempt at `run_at`.
    Retried { run_at: DateTime<Utc> },
    /// Retry budget exhausted; the job is terminally failed.
    Terminal,
    /// The caller no longer owned the job.
    Stale,
}

/// Outcome of a schedule advance.
#[derive(Debug)]
pub enum ScheduleAdvance {
    Enqueued(Job),
    /// The schedule was disabled or already advanced by a concurrent tick.
    Skipped,
}

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub job_type: Option<String>,
}

/// One page of jobs plus the total row count for the filter.
#[derive(Debug)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total_items: i64,
}

/// Per-state counts plus the age of the oldest queued job.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct JobStats {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub canceled: i64,
    pub oldest_queued_age_sec: i64,
}

/// Postgres-backed store for jobs and schedules.
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
    registry: SharedJobRegistry,
    backoff: Backoff,
}

impl JobStore {
    pub fn new(pool: PgPool, registry: SharedJobRegistry, backoff: Backoff) -> Self {
        Self {
            pool,
            registry,
            backoff,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn registry(&self) -> &SharedJobRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Insert a new `queued` job.
    ///
    /// Rejects unregistered job types and non-positive attempt budgets; a
    /// colliding idempotency key surfaces as its own error class so callers
    /// can treat it as success-equivalent.
    pub async fn enqueue(&self, new: NewJob) -> JobResult<Job> {
        let default_max_attempts = self
            .registry
            .default_max_attempts(&new.job_type)
            .ok_or_else(|| JobError::UnknownJobType(new.job_type.clone()))?;

        let max_attempts = new.max_attempts.unwrap_or(default_max_attempts);
        if max_attempts < 1 {
            return Err(JobError::Validation(format!(
                "max_attempts must be positive, got {max_attempts}"
            )));
        }

        let now = Utc::now();
        let run_at = new.run_at.unwrap_or(now);

        let result = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, job_type, payload, state, attempts, max_attempts, run_at,
                idempotency_key, schedule_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'queued', 0, $4, $5, $6, $7, $8, $8)
            RETURNING id, job_type, payload, state, attempts, max_attempts, run_at,
                      lease_expires_at, worker_id, last_error, idempotency_key,
                      schedule_id, created_at, updated_at, completed_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&new.job_type)
        .bind(&new.payload)
        .bind(max_attempts)
        .bind(run_at)
        .bind(&new.idempotency_key)
        .bind(new.schedule_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(job) => Ok(job),
            Err(e) if constraint_is(&e, JOBS_IDEMPOTENCY_INDEX) => Err(
                JobError::DuplicateIdempotencyKey(new.idempotency_key.unwrap_or_default()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Claim the single most eligible queued job, if any.
    ///
    /// `FOR UPDATE SKIP LOCKED` makes concurrent claimers pass over rows
    /// another transaction already selected, so this never blocks on a
    /// competing claim and never hands the same row to two workers.
    pub async fn claim(
        &self,
        worker_id: &str,
        lease_duration: StdDuration,
        now: DateTime<Utc>,
    ) -> JobResult<Option<Job>> {
        let lease_expires_at = now + to_chrono(lease_duration)?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH next_job AS (
                SELECT id
                FROM jobs
                WHERE state = 'queued' AND run_at <= $1 AND attempts < max_attempts
                ORDER BY run_at, created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET state = 'running',
                worker_id = $2,
                lease_expires_at = $3,
                attempts = attempts + 1,
                updated_at = $1
            WHERE id IN (SELECT id FROM next_job)
            RETURNING id, job_type, payload, state, attempts, max_attempts, run_at,
                      lease_expires_at, worker_id, last_error, idempotency_key,
                      schedule_id, created_at, updated_at, completed_at
            "#,
        )
        .bind(now)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Extend the lease on a running job still owned by `worker_id`.
    pub async fn renew_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_duration: StdDuration,
        now: DateTime<Utc>,
    ) -> JobResult<Ack> {
        let lease_expires_at = now + to_chrono(lease_duration)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $1, updated_at = $2
            WHERE id = $3 AND worker_id = $4 AND state = 'running'
            "#,
        )
        .bind(lease_expires_at)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(ack_from(result.rows_affected()))
    }

    /// Transition `running → completed` for the owning worker.
    pub async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobResult<Ack> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                completed_at = $1,
                worker_id = NULL,
                lease_expires_at = NULL,
                updated_at = $1
            WHERE id = $2 AND worker_id = $3 AND state = 'running'
            "#,
        )
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(ack_from(result.rows_affected()))
    }

    /// Record a handler failure: re-queue with backoff while attempts remain,
    /// otherwise fail terminally.
    pub async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> JobResult<FailOutcome> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, payload, state, attempts, max_attempts, run_at,
                   lease_expires_at, worker_id, last_error, idempotency_key,
                   schedule_id, created_at, updated_at, completed_at
            FROM jobs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            return Ok(FailOutcome::Stale);
        };
        if !job.is_held_by(worker_id) {
            return Ok(FailOutcome::Stale);
        }

        let last_error = truncate_error(error);
        let outcome = if job.attempts < job.max_attempts {
            let delay = self
                .backoff
                .delay(job.attempts.max(1) as u32, &mut rand::thread_rng());
            let run_at = now + to_chrono(delay)?;

            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'queued',
                    run_at = $1,
                    worker_id = NULL,
                    lease_expires_at = NULL,
                    last_error = $2,
                    updated_at = $3
                WHERE id = $4
                "#,
            )
            .bind(run_at)
            .bind(&last_error)
            .bind(now)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

            FailOutcome::Retried { run_at }
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'failed',
                    worker_id = NULL,
                    lease_expires_at = NULL,
                    last_error = $1,
                    completed_at = $2,
                    updated_at = $2
                WHERE id = $3
                "#,
            )
            .bind(&last_error)
            .bind(now)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

            FailOutcome::Terminal
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Fail a job immediately without consuming its remaining retry budget.
    ///
    /// Used for corruption-class failures: unregistered handler type, payload
    /// that cannot be decoded.
    pub async fn fail_permanent(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> JobResult<Ack> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed',
                worker_id = NULL,
                lease_expires_at = NULL,
                last_error = $1,
                completed_at = $2,
                updated_at = $2
            WHERE id = $3 AND worker_id = $4 AND state = 'running'
            "#,
        )
        .bind(truncate_error(error))
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(ack_from(result.rows_affected()))
    }

    /// Cancel a queued job. Any other state is a conflict.
    pub async fn cancel(&self, job_id: Uuid) -> JobResult<Job> {
        let canceled = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET state = 'canceled', updated_at = $1
            WHERE id = $2 AND state = 'queued'
            RETURNING id, job_type, payload, state, attempts, max_attempts, run_at,
                      lease_expires_at, worker_id, last_error, idempotency_key,
                      schedule_id, created_at, updated_at, completed_at
            "#,
        )
        .bind(Utc::now())
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match canceled {
            Some(job) => Ok(job),
            None => {
                let job = self.get(job_id).await?;
                Err(JobError::NotCancelable { state: job.state })
            }
        }
    }

    /// Re-queue a terminally failed job with a fresh attempt budget.
    pub async fn retry(&self, job_id: Uuid) -> JobResult<Job> {
        let retried = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET state = 'queued',
                attempts = 0,
                run_at = $1,
                completed_at = NULL,
                updated_at = $1
            WHERE id = $2 AND state = 'failed'
            RETURNING id, job_type, payload, state, attempts, max_attempts, run_at,
                      lease_expires_at, worker_id, last_error, idempotency_key,
                      schedule_id, created_at, updated_at, completed_at
            "#,
        )
        .bind(Utc::now())
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match retried {
            Some(job) => Ok(job),
            None => {
                let job = self.get(job_id).await?;
                Err(JobError::NotRetryable { state: job.state })
            }
        }
    }

    /// Reset jobs whose lease expired (dead worker).
    ///
    /// The interrupted attempt stays counted. A job that was already on its
    /// final attempt fails terminally here; re-queueing it would let the next
    /// claim exceed `max_attempts`.
    pub async fn recover_stalled(&self, now: DateTime<Utc>) -> JobResult<u64> {
        let mut tx = self.pool.begin().await?;

        let exhausted = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed',
                worker_id = NULL,
                lease_expires_at = NULL,
                last_error = $1,
                completed_at = $2,
                updated_at = $2
            WHERE state = 'running' AND lease_expires_at < $2 AND attempts >= max_attempts
            "#,
        )
        .bind(LEASE_EXPIRED_ERROR)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'queued',
                worker_id = NULL,
                lease_expires_at = NULL,
                last_error = $1,
                updated_at = $2
            WHERE state = 'running' AND lease_expires_at < $2 AND attempts < max_attempts
            "#,
        )
        .bind(LEASE_EXPIRED_ERROR)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if exhausted + requeued > 0 {
            debug!(requeued, exhausted, "recovered stalled jobs");
        }
        Ok(exhausted + requeued)
    }

    pub async fn get(&self, job_id: Uuid) -> JobResult<Job> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, payload, state, attempts, max_attempts, run_at,
                   lease_expires_at, worker_id, last_error, idempotency_key,
                   schedule_id, created_at, updated_at, completed_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(JobError::JobNotFound(job_id))
    }

    /// List jobs matching the filter, newest first.
    pub async fn list(&self, filter: &JobFilter, page: &Page) -> JobResult<JobPage> {
        let items = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, payload, state, attempts, max_attempts, run_at,
                   lease_expires_at, worker_id, last_error, idempotency_key,
                   schedule_id, created_at, updated_at, completed_at
            FROM jobs
            WHERE ($1::job_state IS NULL OR state = $1)
              AND ($2::text IS NULL OR job_type = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.state)
        .bind(&filter.job_type)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total_items = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM jobs
            WHERE ($1::job_state IS NULL OR state = $1)
              AND ($2::text IS NULL OR job_type = $2)
            "#,
        )
        .bind(filter.state)
        .bind(&filter.job_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(JobPage { items, total_items })
    }

    pub async fn stats(&self) -> JobResult<JobStats> {
        let stats = sqlx::query_as::<_, JobStats>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE state = 'queued')    AS queued,
                COUNT(*) FILTER (WHERE state = 'running')   AS running,
                COUNT(*) FILTER (WHERE state = 'completed') AS completed,
                COUNT(*) FILTER (WHERE state = 'failed')    AS failed,
                COUNT(*) FILTER (WHERE state = 'canceled')  AS canceled,
                COALESCE(
                    EXTRACT(EPOCH FROM now() - MIN(created_at) FILTER (WHERE state = 'queued'))::BIGINT,
                    0
                ) AS oldest_queued_age_sec
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    pub async fn create_schedule(&self, new: NewSchedule) -> JobResult<Schedule> {
        if !self.registry.is_registered(&new.job_type) {
            return Err(JobError::UnknownJobType(new.job_type));
        }
        if new.max_attempts < 1 {
            return Err(JobError::Validation(format!(
                "max_attempts must be positive, got {}",
                new.max_attempts
            )));
        }
        validate_cron_expr(&new.cron_expr)?;

        let now = Utc::now();
        let next_run_at = next_occurrence(&new.cron_expr, now)?;

        let result = sqlx::query_as::<_, Schedule>(
            r#"
            INSERT INTO schedules (
                id, name, job_type, payload, cron_expr, max_attempts, enabled,
                next_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id, name, job_type, payload, cron_expr, max_attempts, enabled,
                      next_run_at, last_run_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(&new.job_type)
        .bind(&new.payload)
        .bind(&new.cron_expr)
        .bind(new.max_attempts)
        .bind(new.enabled)
        .bind(next_run_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(schedule) => Ok(schedule),
            Err(e) if constraint_is(&e, SCHEDULES_NAME_KEY) => {
                Err(JobError::DuplicateScheduleName(new.name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a partial update under a row lock.
    ///
    /// Changing the cron expression, or flipping `enabled` from false to true,
    /// recomputes `next_run_at` from the current instant.
    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        update: ScheduleUpdate,
    ) -> JobResult<Schedule> {
        let mut tx = self.pool.begin().await?;
        let existing = lock_schedule(&mut tx, schedule_id).await?;

        if let Some(job_type) = &update.job_type {
            if !self.registry.is_registered(job_type) {
                return Err(JobError::UnknownJobType(job_type.clone()));
            }
        }
        if let Some(max_attempts) = update.max_attempts {
            if max_attempts < 1 {
                return Err(JobError::Validation(format!(
                    "max_attempts must be positive, got {max_attempts}"
                )));
            }
        }

        let now = Utc::now();
        let name = update.name.unwrap_or(existing.name);
        let job_type = update.job_type.unwrap_or(existing.job_type);
        let payload = update.payload.unwrap_or(existing.payload);
        let max_attempts = update.max_attempts.unwrap_or(existing.max_attempts);
        let enabled = update.enabled.unwrap_or(existing.enabled);

        let cron_changed = update
            .cron_expr
            .as_ref()
            .is_some_and(|expr| *expr != existing.cron_expr);
        let cron_expr = update.cron_expr.unwrap_or(existing.cron_expr);
        let re_enabled = enabled && !existing.enabled;

        let next_run_at = if cron_changed || re_enabled {
            validate_cron_expr(&cron_expr)?;
            next_occurrence(&cron_expr, now)?
        } else {
            existing.next_run_at
        };

        let result = sqlx::query_as::<_, Schedule>(
            r#"
            UPDATE schedules
            SET name = $1, job_type = $2, payload = $3, cron_expr = $4,
                max_attempts = $5, enabled = $6, next_run_at = $7, updated_at = $8
            WHERE id = $9
            RETURNING id, name, job_type, payload, cron_expr, max_attempts, enabled,
                      next_run_at, last_run_at, created_at, updated_at
            "#,
        )
        .bind(&name)
        .bind(&job_type)
        .bind(&payload)
        .bind(&cron_expr)
        .bind(max_attempts)
        .bind(enabled)
        .bind(next_run_at)
        .bind(now)
        .bind(schedule_id)
        .fetch_one(&mut *tx)
        .await;

        let schedule = match result {
            Ok(schedule) => schedule,
            Err(e) if constraint_is(&e, SCHEDULES_NAME_KEY) => {
                return Err(JobError::DuplicateScheduleName(name));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, schedule_id: Uuid) -> JobResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::ScheduleNotFound(schedule_id));
        }
        Ok(())
    }

    /// Enable or disable a schedule. Enabling recomputes `next_run_at` from
    /// the current instant so a long-disabled schedule does not fire for its
    /// entire backlog.
    pub async fn set_schedule_enabled(
        &self,
        schedule_id: Uuid,
        enabled: bool,
    ) -> JobResult<Schedule> {
        self.update_schedule(
            schedule_id,
            ScheduleUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get_schedule(&self, schedule_id: Uuid) -> JobResult<Schedule> {
        sqlx::query_as::<_, Schedule>(
            r#"
            SELECT id, name, job_type, payload, cron_expr, max_attempts, enabled,
                   next_run_at, last_run_at, created_at, updated_at
            FROM schedules
            WHERE id = $1
            "#,
        )
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(JobError::ScheduleNotFound(schedule_id))
    }

    pub async fn list_schedules(&self) -> JobResult<Vec<Schedule>> {
        Ok(sqlx::query_as::<_, Schedule>(
            r#"
            SELECT id, name, job_type, payload, cron_expr, max_attempts, enabled,
                   next_run_at, last_run_at, created_at, updated_at
            FROM schedules
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Schedules due for emission at `now`, soonest first.
    pub async fn due_schedules(&self, now: DateTime<Utc>) -> JobResult<Vec<Schedule>> {
        Ok(sqlx::query_as::<_, Schedule>(
            r#"
            SELECT id, name, job_type, payload, cron_expr, max_attempts, enabled,
                   next_run_at, last_run_at, created_at, updated_at
            FROM schedules
            WHERE enabled = true AND next_run_at <= $1
            ORDER BY next_run_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Atomically emit one job for a due schedule and advance its cursor.
    ///
    /// The schedule row is re-read under `FOR UPDATE`, so of two concurrent
    /// ticks only the first emits; the second observes the advanced cursor
    /// (or a disable that landed in between) and skips. Either the insert and
    /// the cursor advance both commit, or neither does.
    pub async fn advance_schedule_and_enqueue(
        &self,
        schedule_id: Uuid,
        now: DateTime<Utc>,
        next_run_at_after: DateTime<Utc>,
    ) -> JobResult<ScheduleAdvance> {
        let mut tx = self.pool.begin().await?;
        let schedule = lock_schedule(&mut tx, schedule_id).await?;

        if !schedule.enabled || schedule.next_run_at > now {
            return Ok(ScheduleAdvance::Skipped);
        }

        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, job_type, payload, state, attempts, max_attempts, run_at,
                schedule_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'queued', 0, $4, $5, $6, $5, $5)
            RETURNING id, job_type, payload, state, attempts, max_attempts, run_at,
                      lease_expires_at, worker_id, last_error, idempotency_key,
                      schedule_id, created_at, updated_at, completed_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&schedule.job_type)
        .bind(&schedule.payload)
        .bind(schedule.max_attempts)
        .bind(now)
        .bind(schedule.id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE schedules
            SET next_run_at = $1, last_run_at = $2, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(next_run_at_after)
        .bind(now)
        .bind(schedule_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ScheduleAdvance::Enqueued(job))
    }

    /// Upsert a product-defined schedule by name.
    ///
    /// Operator edits to `enabled` survive re-seeding; `next_run_at` is only
    /// recomputed when the seeded cron expression changed.
    pub async fn upsert_system_schedule(&self, new: NewSchedule) -> JobResult<Schedule> {
        validate_cron_expr(&new.cron_expr)?;
        let now = Utc::now();
        let next_run_at = next_occurrence(&new.cron_expr, now)?;

        Ok(sqlx::query_as::<_, Schedule>(
            r#"
            INSERT INTO schedules (
                id, name, job_type, payload, cron_expr, max_attempts, enabled,
                next_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (name) DO UPDATE SET
                job_type = EXCLUDED.job_type,
                payload = EXCLUDED.payload,
                max_attempts = EXCLUDED.max_attempts,
                next_run_at = CASE
                    WHEN schedules.cron_expr = EXCLUDED.cron_expr THEN schedules.next_run_at
                    ELSE EXCLUDED.next_run_at
                END,
                cron_expr = EXCLUDED.cron_expr,
                updated_at = EXCLUDED.updated_at
            RETURNING id, name, job_type, payload, cron_expr, max_attempts, enabled,
                      next_run_at, last_run_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(&new.job_type)
        .bind(&new.payload)
        .bind(&new.cron_expr)
        .bind(new.max_attempts)
        .bind(new.enabled)
        .bind(next_run_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }
}

async fn lock_schedule(
    tx: &mut Transaction<'_, Postgres>,
    schedule_id: Uuid,
) -> JobResult<Schedule> {
    sqlx::query_as::<_, Schedule>(
        r#"
        SELECT id, name, job_type, payload, cron_expr, max_attempts, enabled,
               next_run_at, last_run_at, created_at, updated_at
        FROM schedules
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(schedule_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(JobError::ScheduleNotFound(schedule_id))
}

fn ack_from(rows_affected: u64) -> Ack {
    if rows_affected == 1 {
        Ack::Ok
    } else {
        Ack::Stale
    }
}

fn constraint_is(error: &sqlx::Error, name: &str) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.constraint() == Some(name)
    )
}

fn to_chrono(duration: StdDuration) -> JobResult<Duration> {
    Duration::from_std(duration)
        .map_err(|_| JobError::Validation("duration out of range".to_string()))
}

/// Truncate handler error text at a char boundary within the byte budget.
fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_BYTES {
        return error.to_string();
    }
    let mut end = MAX_ERROR_BYTES;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}
