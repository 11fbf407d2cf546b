//! Admin schedule endpoints.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::jobs::{NewSchedule, Schedule, ScheduleUpdate};
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// Wire shape of a schedule on the admin API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSchedule {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub cron_expr: String,
    pub payload: serde_json::Value,
    pub max_attempts: i32,
    pub enabled: bool,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Schedule> for ApiSchedule {
    fn from(schedule: Schedule) -> Self {
        Self {
            id: schedule.id,
            name: schedule.name,
            job_type: schedule.job_type,
            cron_expr: schedule.cron_expr,
            payload: schedule.payload,
            max_attempts: schedule.max_attempts,
            enabled: schedule.enabled,
            next_run_at: schedule.next_run_at,
            last_run_at: schedule.last_run_at,
            created_at: schedule.created_at,
            updated_at: schedule.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleBody {
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub cron_expr: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchScheduleBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub job_type: Option<String>,
    #[serde(default)]
    pub cron_expr: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// `GET /api/admin/schedules`
pub async fn list_schedules_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<ApiSchedule>>, ApiError> {
    let schedules = state.jobs.list_schedules().await?;
    Ok(Json(schedules.into_iter().map(ApiSchedule::from).collect()))
}

/// `POST /api/admin/schedules`
pub async fn create_schedule_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<CreateScheduleBody>,
) -> Result<(StatusCode, Json<ApiSchedule>), ApiError> {
    let schedule = state
        .jobs
        .create_schedule(NewSchedule {
            name: body.name,
            job_type: body.job_type,
            payload: body
                .payload
                .unwrap_or_else(|| serde_json::json!({})),
            cron_expr: body.cron_expr,
            max_attempts: body.max_attempts.unwrap_or(3),
            enabled: body.enabled.unwrap_or(true),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(schedule.into())))
}

/// `PATCH /api/admin/schedules/{id}`
pub async fn patch_schedule_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchScheduleBody>,
) -> Result<Json<ApiSchedule>, ApiError> {
    let schedule = state
        .jobs
        .update_schedule(
            id,
            ScheduleUpdate {
                name: body.name,
                job_type: body.job_type,
                payload: body.payload,
                cron_expr: body.cron_expr,
                max_attempts: body.max_attempts,
                enabled: body.enabled,
            },
        )
        .await?;

    Ok(Json(schedule.into()))
}

/// `DELETE /api/admin/schedules/{id}`
pub async fn delete_schedule_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.jobs.delete_schedule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/schedules/{id}/enable` - recomputes `nextRunAt`.
pub async fn enable_schedule_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiSchedule>, ApiError> {
    let schedule = state.jobs.enable_schedule(id).await?;
    Ok(Json(schedule.into()))
}

/// `POST /api/admin/schedules/{id}/disable`
pub async fn disable_schedule_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiSchedule>, ApiError> {
    let schedule = state.jobs.disable_schedule(id).await?;
    Ok(Json(schedule.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_schedule_uses_wire_field_names() {
        let api: ApiSchedule = Schedule {
            id: Uuid::now_v7(),
            name: "nightly".to_string(),
            job_type: "noop".to_string(),
            payload: serde_json::json!({}),
            cron_expr: "0 2 * * *".to_string(),
            max_attempts: 3,
            enabled: true,
            next_run_at: Utc::now(),
            last_run_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
        .into();

        let value = serde_json::to_value(&api).unwrap();
        let object = value.as_object().unwrap();
        for field in [
            "id",
            "name",
            "type",
            "cronExpr",
            "payload",
            "maxAttempts",
            "enabled",
            "nextRunAt",
            "lastRunAt",
            "createdAt",
            "updatedAt",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }
    }

    #[test]
    fn create_body_accepts_camel_case() {
        let body: CreateScheduleBody = serde_json::from_str(
            r#"{"name":"nightly","type":"noop","cronExpr":"0 2 * * *","maxAttempts":5}"#,
        )
        .unwrap();
        assert_eq!(body.job_type, "noop");
        assert_eq!(body.cron_expr, "0 2 * * *");
        assert_eq!(body.max_attempts, Some(5));
        assert!(body.enabled.is_none());
    }
}
