//! Application setup and router configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::jobs::JobService;
use crate::server::auth::JwtService;
use crate::server::middleware::admin_auth_middleware;
use crate::server::routes::{
    cancel_job_handler, create_schedule_handler, delete_schedule_handler,
    disable_schedule_handler, enable_schedule_handler, get_job_handler, health_handler,
    job_stats_handler, list_jobs_handler, list_schedules_handler, patch_schedule_handler,
    retry_job_handler,
};

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    pub db_pool: PgPool,
}

/// Build the HTTP application.
///
/// `/health` is public; everything under `/api/admin` sits behind the admin
/// auth middleware.
pub fn build_router(state: AppState, jwt_service: Arc<JwtService>) -> Router {
    let admin_routes = Router::new()
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/stats", get(job_stats_handler))
        .route("/jobs/:id", get(get_job_handler))
        .route("/jobs/:id/retry", post(retry_job_handler))
        .route("/jobs/:id/cancel", post(cancel_job_handler))
        .route(
            "/schedules",
            get(list_schedules_handler).post(create_schedule_handler),
        )
        .route(
            "/schedules/:id",
            patch(patch_schedule_handler).delete(delete_schedule_handler),
        )
        .route("/schedules/:id/enable", post(enable_schedule_handler))
        .route("/schedules/:id/disable", post(disable_schedule_handler))
        .layer(middleware::from_fn(move |request, next| {
            let jwt_service = Arc::clone(&jwt_service);
            admin_auth_middleware(jwt_service, request, next)
        }));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/admin", admin_routes)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
