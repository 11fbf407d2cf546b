//! Admin job endpoints.

use axum::extract::{Extension, Path, Query};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Page;
use crate::kernel::jobs::{Job, JobFilter, JobState, JobStats};
use crate::server::app::AppState;
use crate::server::error::{bad_request, ApiError};

/// Wire shape of a job on the admin API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiJob {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub payload: serde_json::Value,
    pub schedule_id: Option<Uuid>,
}

impl From<Job> for ApiJob {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            state: job.state,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            run_at: job.run_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            last_error: job.last_error,
            payload: job.payload,
            schedule_id: job.schedule_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListResponse {
    pub items: Vec<ApiJob>,
    pub page: i64,
    pub per_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub canceled: i64,
    pub oldest_queued_age_sec: i64,
}

impl From<JobStats> for StatsResponse {
    fn from(stats: JobStats) -> Self {
        Self {
            queued: stats.queued,
            running: stats.running,
            completed: stats.completed,
            failed: stats.failed,
            canceled: stats.canceled,
            oldest_queued_age_sec: stats.oldest_queued_age_sec,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub page: Option<i64>,
    #[serde(rename = "perPage")]
    pub per_page: Option<i64>,
}

/// `GET /api/admin/jobs`
pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<JobListQuery>,
) -> Response {
    let filter_state = match query.state.as_deref() {
        None | Some("") => None,
        Some(raw) => match raw.parse::<JobState>() {
            Ok(parsed) => Some(parsed),
            Err(e) => return bad_request(e),
        },
    };
    let page = match Page::new(query.page.unwrap_or(1), query.per_page.unwrap_or(50)) {
        Ok(page) => page,
        Err(e) => return bad_request(e),
    };

    let filter = JobFilter {
        state: filter_state,
        job_type: query.job_type.filter(|t| !t.is_empty()),
    };

    match state.jobs.list_jobs(&filter, &page).await {
        Ok(result) => Json(JobListResponse {
            items: result.items.into_iter().map(ApiJob::from).collect(),
            page: page.page(),
            per_page: page.per_page(),
            total_items: result.total_items,
            total_pages: page.total_pages(result.total_items),
        })
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// `GET /api/admin/jobs/stats`
pub async fn job_stats_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.jobs.stats().await?;
    Ok(Json(stats.into()))
}

/// `GET /api/admin/jobs/{id}`
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiJob>, ApiError> {
    let job = state.jobs.get_job(id).await?;
    Ok(Json(job.into()))
}

/// `POST /api/admin/jobs/{id}/retry` - 409 unless the job is `failed`.
pub async fn retry_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiJob>, ApiError> {
    let job = state.jobs.retry_job(id).await?;
    Ok(Json(job.into()))
}

/// `POST /api/admin/jobs/{id}/cancel` - 409 unless the job is `queued`.
pub async fn cancel_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiJob>, ApiError> {
    let job = state.jobs.cancel_job(id).await?;
    Ok(Json(job.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job {
            id: Uuid::now_v7(),
            job_type: "noop".to_string(),
            payload: serde_json::json!({}),
            state: JobState::Queued,
            attempts: 0,
            max_attempts: 3,
            run_at: Utc::now(),
            lease_expires_at: None,
            worker_id: None,
            last_error: None,
            idempotency_key: None,
            schedule_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn api_job_uses_wire_field_names() {
        let api: ApiJob = sample_job().into();
        let value = serde_json::to_value(&api).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "id",
            "type",
            "state",
            "attempts",
            "maxAttempts",
            "runAt",
            "createdAt",
            "updatedAt",
            "completedAt",
            "lastError",
            "payload",
            "scheduleId",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }
        assert_eq!(object.len(), 12);
        assert_eq!(object["state"], "queued");
    }

    #[test]
    fn internal_columns_are_not_exposed() {
        let api: ApiJob = sample_job().into();
        let value = serde_json::to_value(&api).unwrap();
        let object = value.as_object().unwrap();

        assert!(!object.contains_key("workerId"));
        assert!(!object.contains_key("leaseExpiresAt"));
        assert!(!object.contains_key("idempotencyKey"));
    }

    #[test]
    fn stats_response_field_names() {
        let response = StatsResponse {
            queued: 1,
            running: 2,
            completed: 3,
            failed: 4,
            canceled: 5,
            oldest_queued_age_sec: 6,
        };
        let value = serde_json::to_value(&response).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "queued",
            "running",
            "completed",
            "failed",
            "canceled",
            "oldestQueuedAgeSec",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }
    }
}
