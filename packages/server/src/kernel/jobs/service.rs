//! Service facade: lifecycle and the admin surface of the jobs subsystem.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::backoff::Backoff;
use super::error::JobResult;
use super::job::{Job, NewJob};
use super::registry::SharedJobRegistry;
use super::schedule::{NewSchedule, Schedule, ScheduleUpdate};
use super::scheduler::Scheduler;
use super::store::{JobFilter, JobPage, JobStats, JobStore};
use super::sweeper::RecoverySweeper;
use super::worker::{WorkerPool, WorkerPoolConfig};
use crate::config::JobsConfig;
use crate::kernel::webhook_pruner::WebhookPruner;
use crate::kernel::ServerDeps;
use crate::common::Page;

/// Owns the store and spawns the moving parts of the subsystem.
#[derive(Clone)]
pub struct JobService {
    store: JobStore,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobsConfig,
    webhook_prune_retention_days: i64,
}

impl JobService {
    pub fn new(
        deps: Arc<ServerDeps>,
        registry: SharedJobRegistry,
        config: JobsConfig,
        webhook_prune_retention_days: i64,
    ) -> Self {
        let backoff = Backoff::new(
            config.backoff_base,
            config.backoff_cap,
            config.backoff_jitter_fraction,
        );
        let store = JobStore::new(deps.db.clone(), Arc::clone(&registry), backoff);

        Self {
            store,
            registry,
            deps,
            config,
            webhook_prune_retention_days,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Start background processing per the configuration.
    ///
    /// `jobs.enabled = false` runs only the legacy webhook pruner;
    /// `jobs.scheduler_enabled = false` runs workers and the sweeper without
    /// the scheduler (another process owns schedule advancement).
    pub fn start(&self) -> JobServiceHandle {
        let shutdown = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if !self.config.enabled {
            warn!("jobs subsystem disabled; running legacy webhook pruner only");
            let pruner =
                WebhookPruner::new(self.deps.db.clone(), self.webhook_prune_retention_days);
            tasks.push(pruner.spawn(shutdown.clone()));
            return JobServiceHandle { shutdown, tasks };
        }

        let pool_config = WorkerPoolConfig {
            worker_count: self.config.worker_count,
            claim_interval: self.config.claim_interval,
            lease_duration: self.config.lease_duration,
            renew_interval: self.config.renew_interval,
        };
        let pool = WorkerPool::new(
            self.store.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.deps),
            pool_config,
        );
        tasks.extend(pool.spawn(shutdown.clone()));

        if self.config.scheduler_enabled {
            let scheduler =
                Scheduler::new(self.store.clone(), self.config.scheduler_tick_interval);
            tasks.push(scheduler.spawn(shutdown.clone()));
        } else {
            info!("scheduler disabled; workers and sweeper only");
        }

        let sweeper = RecoverySweeper::new(self.store.clone(), self.config.recovery_interval);
        tasks.push(sweeper.spawn(shutdown.clone()));

        info!(
            worker_count = self.config.worker_count,
            scheduler_enabled = self.config.scheduler_enabled,
            "jobs subsystem started"
        );
        JobServiceHandle { shutdown, tasks }
    }

    /// Upsert the product's standing schedules. Handlers for the referenced
    /// job types must already be registered.
    pub async fn seed_system_schedules(&self) -> JobResult<()> {
        let seeds = [
            NewSchedule {
                name: "auth-cleanup-hourly".to_string(),
                job_type: "cleanup_auth".to_string(),
                payload: serde_json::json!({}),
                cron_expr: "7 * * * *".to_string(),
                max_attempts: 3,
                enabled: true,
            },
            NewSchedule {
                name: "webhook-prune-daily".to_string(),
                job_type: "prune_webhook_events".to_string(),
                payload: serde_json::json!({ "retention_days": self.webhook_prune_retention_days }),
                cron_expr: "23 3 * * *".to_string(),
                max_attempts: 3,
                enabled: true,
            },
        ];

        for seed in seeds {
            let name = seed.name.clone();
            let schedule = self.store.upsert_system_schedule(seed).await?;
            info!(name = %name, schedule_id = %schedule.id, "seeded system schedule");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Admin pass-through
    // ------------------------------------------------------------------

    pub async fn enqueue(&self, new: NewJob) -> JobResult<Job> {
        self.store.enqueue(new).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter, page: &Page) -> JobResult<JobPage> {
        self.store.list(filter, page).await
    }

    pub async fn get_job(&self, id: Uuid) -> JobResult<Job> {
        self.store.get(id).await
    }

    pub async fn retry_job(&self, id: Uuid) -> JobResult<Job> {
        self.store.retry(id).await
    }

    pub async fn cancel_job(&self, id: Uuid) -> JobResult<Job> {
        self.store.cancel(id).await
    }

    pub async fn stats(&self) -> JobResult<JobStats> {
        self.store.stats().await
    }

    pub async fn list_schedules(&self) -> JobResult<Vec<Schedule>> {
        self.store.list_schedules().await
    }

    pub async fn get_schedule(&self, id: Uuid) -> JobResult<Schedule> {
        self.store.get_schedule(id).await
    }

    pub async fn create_schedule(&self, new: NewSchedule) -> JobResult<Schedule> {
        self.store.create_schedule(new).await
    }

    pub async fn update_schedule(&self, id: Uuid, update: ScheduleUpdate) -> JobResult<Schedule> {
        self.store.update_schedule(id, update).await
    }

    pub async fn delete_schedule(&self, id: Uuid) -> JobResult<()> {
        self.store.delete_schedule(id).await
    }

    pub async fn enable_schedule(&self, id: Uuid) -> JobResult<Schedule> {
        self.store.set_schedule_enabled(id, true).await
    }

    pub async fn disable_schedule(&self, id: Uuid) -> JobResult<Schedule> {
        self.store.set_schedule_enabled(id, false).await
    }
}

/// Running background tasks plus their shutdown signal.
pub struct JobServiceHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl JobServiceHandle {
    /// Signal all tasks to drain and wait up to `timeout` for them.
    ///
    /// Tasks still running after the grace window are aborted; in-flight
    /// attempts they were executing are reclaimed later by the recovery
    /// sweep in whichever process survives.
    pub async fn stop(mut self, timeout: Duration) {
        info!("stopping jobs subsystem");
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = 0usize;
        for task in &mut self.tasks {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut *task).await.is_err() {
                task.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            warn!(aborted, "tasks did not drain within grace period");
        }
        info!("jobs subsystem stopped");
    }
}
