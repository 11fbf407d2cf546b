//! Test harness with testcontainers for integration testing.
//!
//! A single Postgres container is shared across the whole test run; every
//! harness gets its own freshly migrated database inside it, so tests can
//! assert on global counts without stepping on each other.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use server_core::config::JobsConfig;
use server_core::kernel::jobs::{
    Backoff, Job, JobRegistry, JobService, JobState, JobStore, SharedJobRegistry,
};
use server_core::kernel::ServerDeps;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    base_url: String,
    admin_pool: PgPool,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Respect RUST_LOG when debugging tests; try_init avoids a panic if a
        // prior test already installed a subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let base_url = format!("postgresql://postgres:postgres@{host}:{port}");

        let admin_pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&format!("{base_url}/postgres"))
            .await
            .context("Failed to connect to Postgres")?;

        Ok(Self {
            base_url,
            admin_pool,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Per-test harness: an isolated, migrated database plus queue plumbing.
pub struct TestHarness {
    pub db_pool: PgPool,
    pub deps: Arc<ServerDeps>,
    pub registry: SharedJobRegistry,
    pub jobs_config: JobsConfig,
}

impl TestHarness {
    /// Create a harness with the built-in handlers registered.
    pub async fn new() -> Result<Self> {
        let mut registry = JobRegistry::new();
        server_core::domains::register_builtin_jobs(&mut registry);
        Self::with_registry(registry).await
    }

    /// Create a harness with a caller-supplied registry.
    pub async fn with_registry(registry: JobRegistry) -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_name = format!("test_{}", Uuid::new_v4().simple());
        sqlx::query(&format!(r#"CREATE DATABASE "{db_name}""#))
            .execute(&infra.admin_pool)
            .await
            .context("Failed to create test database")?;

        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&format!("{}/{db_name}", infra.base_url))
            .await
            .context("Failed to connect to test database")?;

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run migrations")?;

        let jobs_config = JobsConfig {
            worker_count: 1,
            claim_interval: Duration::from_millis(20),
            lease_duration: Duration::from_secs(5),
            renew_interval: Duration::from_secs(1),
            scheduler_tick_interval: Duration::from_millis(100),
            recovery_interval: Duration::from_millis(100),
            backoff_base: Duration::from_millis(50),
            backoff_cap: Duration::from_secs(1),
            backoff_jitter_fraction: 0.0,
            ..JobsConfig::default()
        };

        Ok(Self {
            db_pool: db_pool.clone(),
            deps: Arc::new(ServerDeps::new(db_pool)),
            registry: Arc::new(registry),
            jobs_config,
        })
    }

    /// A store over this harness's database and registry.
    pub fn store(&self) -> JobStore {
        JobStore::new(
            self.db_pool.clone(),
            Arc::clone(&self.registry),
            Backoff::new(
                self.jobs_config.backoff_base,
                self.jobs_config.backoff_cap,
                self.jobs_config.backoff_jitter_fraction,
            ),
        )
    }

    /// A service facade over this harness's database and registry.
    pub fn service(&self) -> JobService {
        JobService::new(
            Arc::clone(&self.deps),
            Arc::clone(&self.registry),
            self.jobs_config.clone(),
            30,
        )
    }

    /// Poll until the job reaches `state` or the timeout elapses.
    pub async fn wait_for_state(
        &self,
        store: &JobStore,
        job_id: Uuid,
        state: JobState,
        timeout: Duration,
    ) -> Result<Job> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = store.get(job_id).await?;
            if job.state == state {
                return Ok(job);
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!(
                    "job {job_id} did not reach {state} within {timeout:?}; currently {}",
                    job.state
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        TestHarness::new().await.expect("harness setup failed")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
