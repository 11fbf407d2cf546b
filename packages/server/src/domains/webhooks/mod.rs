//! Webhook delivery domain.
//!
//! Outgoing webhook events are persisted and delivered by background jobs;
//! old delivered events are pruned on a schedule.

pub mod jobs;
pub mod models;

pub use jobs::register_webhook_jobs;
pub use models::WebhookEvent;
