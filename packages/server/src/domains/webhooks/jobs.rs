//! Background jobs for the webhooks domain.
//!
//! `deliver_webhook` posts a stored event to its subscriber endpoint; the
//! queue's backoff handles flaky endpoints. `prune_webhook_events` is the
//! scheduled counterpart of the legacy in-process pruner.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::models::WebhookEvent;
use crate::kernel::jobs::{HandlerFailure, JobContext, JobOptions, JobRegistry};
use crate::kernel::webhook_pruner::prune_delivered_events;

/// Deliver one stored webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverWebhookJob {
    pub event_id: Uuid,
}

impl DeliverWebhookJob {
    pub const JOB_TYPE: &'static str = "deliver_webhook";

    pub fn new(event_id: Uuid) -> Self {
        Self { event_id }
    }
}

/// Prune delivered webhook events older than the retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneWebhookEventsJob {
    pub retention_days: i64,
}

impl PruneWebhookEventsJob {
    pub const JOB_TYPE: &'static str = "prune_webhook_events";
}

/// Handle `deliver_webhook`.
///
/// A non-2xx response is a transient failure: the attempt status is recorded
/// and the queue re-delivers with backoff. An event that no longer exists is
/// permanent; retrying cannot bring the row back.
pub async fn handle_deliver_webhook(job: DeliverWebhookJob, ctx: JobContext) -> Result<()> {
    let event = WebhookEvent::find_by_id(job.event_id, &ctx.deps.db)
        .await?
        .ok_or_else(|| {
            anyhow::Error::new(HandlerFailure::non_retryable(format!(
                "webhook event {} not found",
                job.event_id
            )))
        })?;

    if event.delivered_at.is_some() {
        // Already delivered by an earlier attempt whose completion was lost.
        return Ok(());
    }

    let response = ctx
        .deps
        .http
        .post(&event.url)
        .header("X-Webhook-Event", &event.event_type)
        .json(&event.payload)
        .send()
        .await
        .with_context(|| format!("delivering webhook event {}", event.id))?;

    let status = response.status();
    if status.is_success() {
        event.mark_delivered(status.as_u16() as i32, &ctx.deps.db).await?;
        info!(event_id = %event.id, status = status.as_u16(), "webhook delivered");
        Ok(())
    } else {
        event
            .record_attempt_status(status.as_u16() as i32, &ctx.deps.db)
            .await?;
        anyhow::bail!("endpoint returned {status} for event {}", event.id)
    }
}

/// Handle `prune_webhook_events`.
pub async fn handle_prune_webhook_events(
    job: PruneWebhookEventsJob,
    ctx: JobContext,
) -> Result<()> {
    let pruned = prune_delivered_events(&ctx.deps.db, job.retention_days).await?;
    if pruned > 0 {
        info!(pruned, retention_days = job.retention_days, "pruned webhook events");
    }
    Ok(())
}

/// Register the webhook job types.
pub fn register_webhook_jobs(registry: &mut JobRegistry) {
    registry.register::<DeliverWebhookJob, _, _>(
        DeliverWebhookJob::JOB_TYPE,
        JobOptions {
            timeout: Duration::from_secs(30),
            default_max_attempts: 5,
        },
        handle_deliver_webhook,
    );
    registry.register::<PruneWebhookEventsJob, _, _>(
        PruneWebhookEventsJob::JOB_TYPE,
        JobOptions::default(),
        handle_prune_webhook_events,
    );
}
