//! Server binary: config, migrations, jobs subsystem, admin HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server_core::config::Config;
use server_core::domains::register_builtin_jobs;
use server_core::kernel::jobs::{JobRegistry, JobService};
use server_core::kernel::ServerDeps;
use server_core::server::{build_router, AppState, JwtService};

/// Grace period for in-flight handlers on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;

    let mut registry = JobRegistry::new();
    register_builtin_jobs(&mut registry);
    let registry = Arc::new(registry);

    let deps = Arc::new(ServerDeps::new(pool.clone()));
    let jobs = JobService::new(
        Arc::clone(&deps),
        registry,
        config.jobs.clone(),
        config.webhook_prune_retention_days,
    );

    if config.jobs.enabled {
        jobs.seed_system_schedules()
            .await
            .context("seeding system schedules")?;
    }
    let jobs_handle = jobs.start();

    let jwt_service = Arc::new(JwtService::new(&config.admin_jwt_secret));
    let app = build_router(
        AppState {
            jobs: jobs.clone(),
            db_pool: pool,
        },
        jwt_service,
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(port = config.port, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
        })
        .await?;

    jobs_handle.stop(SHUTDOWN_GRACE).await;
    Ok(())
}
