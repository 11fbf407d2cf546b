//! Scheduler: advances due cron schedules into queued jobs.
//!
//! One ticker per process. De-duplication across processes happens in the
//! store (row-locked re-read in `advance_schedule_and_enqueue`), so running
//! several schedulers concurrently still emits at most one job per fire.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::schedule::next_occurrence;
use super::store::{JobStore, ScheduleAdvance};

pub struct Scheduler {
    store: JobStore,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(store: JobStore, tick_interval: Duration) -> Self {
        Self {
            store,
            tick_interval,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        info!(tick_interval_sec = self.tick_interval.as_secs(), "scheduler starting");
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        // Storage trouble is not fatal; the next tick retries.
                        error!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Emit one job per due schedule and advance each cursor past `now`.
    ///
    /// Missed fires are dropped: `next_occurrence` always lands strictly in
    /// the future, so a schedule that was down for hours emits exactly once.
    async fn tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let due = self.store.due_schedules(now).await?;

        for schedule in due {
            let next_run_at_after = match next_occurrence(&schedule.cron_expr, now) {
                Ok(next) => next,
                Err(e) => {
                    // A schedule with an unparseable expression can only get
                    // here through a bad migration; skip it rather than wedge
                    // the tick.
                    error!(schedule_id = %schedule.id, name = %schedule.name, error = %e, "schedule has invalid cron expression");
                    continue;
                }
            };

            match self
                .store
                .advance_schedule_and_enqueue(schedule.id, now, next_run_at_after)
                .await
            {
                Ok(ScheduleAdvance::Enqueued(job)) => {
                    debug!(
                        schedule_id = %schedule.id,
                        name = %schedule.name,
                        job_id = %job.id,
                        next_run_at = %next_run_at_after,
                        "schedule emitted job"
                    );
                }
                Ok(ScheduleAdvance::Skipped) => {
                    debug!(schedule_id = %schedule.id, name = %schedule.name, "schedule advance skipped");
                }
                Err(e) => {
                    error!(schedule_id = %schedule.id, name = %schedule.name, error = %e, "schedule advance failed");
                }
            }
        }

        Ok(())
    }
}
