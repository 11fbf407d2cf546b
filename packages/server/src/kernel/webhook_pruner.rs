//! Legacy in-process webhook event pruner.
//!
//! Before the jobs subsystem existed, pruning ran on a plain ticker inside
//! the server process. The ticker is kept for deployments that turn the jobs
//! subsystem off entirely; everyone else gets the same pruning through the
//! seeded `prune_webhook_events` schedule.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const PRUNE_TICK_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct WebhookPruner {
    pool: PgPool,
    retention_days: i64,
}

impl WebhookPruner {
    pub fn new(pool: PgPool, retention_days: i64) -> Self {
        Self {
            pool,
            retention_days,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        info!(
            retention_days = self.retention_days,
            "webhook pruner starting"
        );
        let mut interval = tokio::time::interval(PRUNE_TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match prune_delivered_events(&self.pool, self.retention_days).await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "pruned delivered webhook events"),
                        Err(e) => error!(error = %e, "webhook prune failed"),
                    }
                }
            }
        }

        info!("webhook pruner stopped");
    }
}

/// Delete delivered webhook events older than the retention window.
pub async fn prune_delivered_events(pool: &PgPool, retention_days: i64) -> anyhow::Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);

    let result = sqlx::query(
        r#"
        DELETE FROM webhook_events
        WHERE delivered_at IS NOT NULL AND delivered_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
