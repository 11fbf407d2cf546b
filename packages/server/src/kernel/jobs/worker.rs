//! Worker pool: claims jobs, runs handlers under a lease, reports outcomes.
//!
//! Each worker is a long-lived tokio task. While a handler runs, a renewal
//! companion keeps the lease alive; if the store reports the lease stale
//! twice in a row the companion cancels the job's context and the recovery
//! sweep takes over ownership. Handler panics are contained and recorded as
//! ordinary failures.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::{JobContext, LeaseToken};
use super::job::Job;
use super::registry::{FailureKind, HandlerFailure, JobRegistry, SharedJobRegistry};
use super::store::{Ack, FailOutcome, JobStore};
use crate::kernel::ServerDeps;

/// Consecutive stale renewals before the companion cancels the handler.
const STALE_RENEWALS_BEFORE_CANCEL: u32 = 2;

/// Fraction of the lease kept as headroom below the per-attempt deadline.
const LEASE_SAFETY_DIVISOR: u32 = 5;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub claim_interval: Duration,
    pub lease_duration: Duration,
    pub renew_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            claim_interval: Duration::from_millis(500),
            lease_duration: Duration::from_secs(60),
            renew_interval: Duration::from_secs(20),
        }
    }
}

/// Spawns and owns the claim/execute loops.
pub struct WorkerPool {
    store: JobStore,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        store: JobStore,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            store,
            registry,
            deps,
            config,
        }
    }

    /// Spawn all workers. They run until `shutdown` is cancelled.
    pub fn spawn(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.config.worker_count.max(1))
            .map(|index| {
                let worker = Worker {
                    id: format!("worker-{index}-{}", Uuid::new_v4()),
                    store: self.store.clone(),
                    registry: Arc::clone(&self.registry),
                    deps: Arc::clone(&self.deps),
                    config: self.config.clone(),
                };
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            })
            .collect()
    }
}

struct Worker {
    id: String,
    store: JobStore,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: WorkerPoolConfig,
}

impl Worker {
    async fn run(self, shutdown: CancellationToken) {
        info!(worker_id = %self.id, "worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self
                .store
                .claim(&self.id, self.config.lease_duration, Utc::now())
                .await
            {
                Ok(Some(job)) => self.process(job, &shutdown).await,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.idle_sleep()) => {}
                    }
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "claim failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.id, "worker stopped");
    }

    /// Claim-poll interval with a little jitter so idle workers do not hit
    /// the store in lockstep.
    fn idle_sleep(&self) -> Duration {
        let base = self.config.claim_interval;
        let jitter_ms = base.as_millis() as u64 / 5;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    async fn process(&self, job: Job, shutdown: &CancellationToken) {
        let job_id = job.id;
        let job_type = job.job_type.clone();
        debug!(worker_id = %self.id, job_id = %job_id, job_type = %job_type, attempt = job.attempts, "claimed job");

        let Some(registration) = self.registry.lookup(&job_type) else {
            warn!(job_id = %job_id, job_type = %job_type, "no handler registered");
            let message = format!("no handler registered for job type {job_type:?}");
            if let Err(e) = self
                .store
                .fail_permanent(job_id, &self.id, &message, Utc::now())
                .await
            {
                error!(job_id = %job_id, error = %e, "failed to record missing handler");
            }
            return;
        };
        let handler_timeout = registration.options.timeout;

        let job_cancel = shutdown.child_token();
        let lease = LeaseToken::new();
        let companion_stop = CancellationToken::new();
        let companion = self.spawn_renewal_companion(
            job_id,
            job_cancel.clone(),
            lease.clone(),
            companion_stop.clone(),
        );

        let ctx = JobContext {
            job_id,
            attempt: job.attempts,
            payload: job.payload.clone(),
            cancel: job_cancel,
            lease,
            deps: Arc::clone(&self.deps),
        };

        let deadline = attempt_deadline(handler_timeout, self.config.lease_duration);
        let outcome = self.execute(&job_type, ctx, deadline).await;

        companion_stop.cancel();
        let _ = companion.await;

        self.report(job_id, &job_type, outcome).await;
    }

    /// Run the handler inside its own task so a panic is contained, bounded
    /// by the per-attempt deadline.
    async fn execute(
        &self,
        job_type: &str,
        ctx: JobContext,
        deadline: Duration,
    ) -> Result<(), HandlerFailure> {
        let registry = Arc::clone(&self.registry);
        let job_type_owned = job_type.to_string();
        let mut handle =
            tokio::spawn(async move { execute_registered(&registry, &job_type_owned, ctx).await });

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    Err(HandlerFailure::retryable(format!(
                        "handler panicked: {join_error}"
                    )))
                } else {
                    Err(HandlerFailure::retryable("handler task was cancelled"))
                }
            }
            Err(_) => {
                handle.abort();
                Err(HandlerFailure::retryable(format!(
                    "attempt timed out after {deadline:?}"
                )))
            }
        }
    }

    async fn report(&self, job_id: Uuid, job_type: &str, outcome: Result<(), HandlerFailure>) {
        let now = Utc::now();
        match outcome {
            Ok(()) => {
                match self.store.complete(job_id, &self.id, now).await {
                    Ok(Ack::Ok) => {
                        debug!(job_id = %job_id, job_type = %job_type, "job completed");
                    }
                    Ok(Ack::Stale) => {
                        warn!(job_id = %job_id, job_type = %job_type, "completion lost: lease no longer held");
                    }
                    Err(e) => error!(job_id = %job_id, error = %e, "failed to mark job completed"),
                }
            }
            Err(failure) => {
                warn!(
                    job_id = %job_id,
                    job_type = %job_type,
                    error = %failure.message,
                    "job attempt failed"
                );
                let result = match failure.kind {
                    FailureKind::Retryable => {
                        self.store.fail(job_id, &self.id, &failure.message, now).await
                    }
                    FailureKind::NonRetryable => self
                        .store
                        .fail_permanent(job_id, &self.id, &failure.message, now)
                        .await
                        .map(|ack| match ack {
                            Ack::Ok => FailOutcome::Terminal,
                            Ack::Stale => FailOutcome::Stale,
                        }),
                };
                match result {
                    Ok(FailOutcome::Retried { run_at }) => {
                        debug!(job_id = %job_id, run_at = %run_at, "job re-queued for retry");
                    }
                    Ok(FailOutcome::Terminal) => {
                        warn!(job_id = %job_id, job_type = %job_type, "job terminally failed");
                    }
                    Ok(FailOutcome::Stale) => {
                        warn!(job_id = %job_id, "failure report lost: lease no longer held");
                    }
                    Err(e) => error!(job_id = %job_id, error = %e, "failed to record job failure"),
                }
            }
        }
    }

    /// Keep the lease fresh while the handler runs; on repeated stale results
    /// mark the lease lost and cancel the handler's context.
    fn spawn_renewal_companion(
        &self,
        job_id: Uuid,
        job_cancel: CancellationToken,
        lease: LeaseToken,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let worker_id = self.id.clone();
        let renew_interval = self.config.renew_interval;
        let lease_duration = self.config.lease_duration;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(renew_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // skip the immediate first tick
            let mut stale_count = 0u32;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        match store.renew_lease(job_id, &worker_id, lease_duration, Utc::now()).await {
                            Ok(Ack::Ok) => stale_count = 0,
                            Ok(Ack::Stale) => {
                                stale_count += 1;
                                warn!(job_id = %job_id, worker_id = %worker_id, stale_count, "lease renewal returned stale");
                                if stale_count >= STALE_RENEWALS_BEFORE_CANCEL {
                                    lease.mark_lost();
                                    job_cancel.cancel();
                                    break;
                                }
                            }
                            Err(e) => {
                                // Transient store trouble: keep trying, the
                                // lease may still be extended on the next tick.
                                warn!(job_id = %job_id, error = %e, "lease renewal failed");
                            }
                        }
                    }
                }
            }
        })
    }
}

async fn execute_registered(
    registry: &JobRegistry,
    job_type: &str,
    ctx: JobContext,
) -> Result<(), HandlerFailure> {
    match registry.lookup(job_type) {
        Some(registration) => registration.execute(ctx).await,
        None => Err(HandlerFailure::non_retryable(format!(
            "no handler registered for job type {job_type:?}"
        ))),
    }
}

/// Per-attempt deadline: the handler's declared timeout, further bounded by
/// the lease minus a safety margin so a completing handler can still report
/// before the sweep could reclaim the job.
fn attempt_deadline(handler_timeout: Duration, lease_duration: Duration) -> Duration {
    let margin = lease_duration / LEASE_SAFETY_DIVISOR;
    let lease_bound = lease_duration.saturating_sub(margin);
    handler_timeout.min(lease_bound).max(Duration::from_millis(50))
}
