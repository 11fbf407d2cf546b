//! Webhook event model.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A webhook event awaiting (or past) delivery to a subscriber endpoint.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub url: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_status: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub async fn create(
        url: &str,
        event_type: &str,
        payload: serde_json::Value,
        pool: &PgPool,
    ) -> Result<Self> {
        let event = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO webhook_events (id, url, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, url, event_type, payload, delivered_at, last_status, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(url)
        .bind(event_type)
        .bind(payload)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        let event = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, url, event_type, payload, delivered_at, last_status, created_at
            FROM webhook_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(event)
    }

    pub async fn mark_delivered(&self, status: i32, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET delivered_at = $1, last_status = $2
            WHERE id = $3
            "#,
        )
        .bind(Utc::now())
        .bind(status)
        .bind(self.id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn record_attempt_status(&self, status: i32, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE webhook_events SET last_status = $1 WHERE id = $2")
            .bind(status)
            .bind(self.id)
            .execute(pool)
            .await?;

        Ok(())
    }
}
