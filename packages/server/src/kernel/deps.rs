//! Shared infrastructure dependencies handed to job handlers.

use sqlx::PgPool;

/// Process-wide dependencies: the database pool and an HTTP client.
///
/// Handlers receive these through the execution context rather than capturing
/// globals, which keeps them testable against a harness pool.
#[derive(Clone)]
pub struct ServerDeps {
    pub db: PgPool,
    pub http: reqwest::Client,
}

impl ServerDeps {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http(db: PgPool, http: reqwest::Client) -> Self {
        Self { db, http }
    }
}
