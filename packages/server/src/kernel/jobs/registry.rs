//! Registry mapping job type names to handlers.
//!
//! Each domain registers its job types at startup. The worker pool uses the
//! registry to deserialize payloads and execute handlers without knowing the
//! concrete types; the store uses it to validate job types and fill in
//! per-type defaults at enqueue time.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::warn;

use super::context::JobContext;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient; retried while attempts remain.
    Retryable,
    /// Permanent; the job fails immediately.
    NonRetryable,
}

/// A handler failure carrying its retry classification.
#[derive(Debug)]
pub struct HandlerFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl HandlerFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Retryable,
            message: message.into(),
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NonRetryable,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerFailure {}

type BoxedHandler = Box<
    dyn Fn(JobContext) -> Pin<Box<dyn Future<Output = Result<(), HandlerFailure>> + Send>>
        + Send
        + Sync,
>;

/// Per-type execution settings declared at registration.
#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    /// Maximum wall-clock per attempt. The worker further bounds this by the
    /// remaining lease.
    pub timeout: Duration,
    /// Used when enqueue does not specify a budget.
    pub default_max_attempts: i32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            default_max_attempts: 3,
        }
    }
}

impl JobOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// A registered job type: its handler plus execution settings.
pub struct JobRegistration {
    pub options: JobOptions,
    handler: BoxedHandler,
}

impl JobRegistration {
    pub async fn execute(&self, ctx: JobContext) -> Result<(), HandlerFailure> {
        (self.handler)(ctx).await
    }
}

/// Process-scoped table of job types, built once at startup.
#[derive(Default)]
pub struct JobRegistry {
    registrations: HashMap<&'static str, JobRegistration>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `job_type` with a typed payload.
    ///
    /// The payload is deserialized from the job's JSON at execution time; a
    /// decode failure is a non-retryable handler failure. Registering the same
    /// type twice replaces the earlier entry.
    pub fn register<P, F, Fut>(&mut self, job_type: &'static str, options: JobOptions, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, JobContext) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |ctx: JobContext| {
            let handler = handler.clone();
            Box::pin(async move {
                let payload: P = serde_json::from_value(ctx.payload.clone()).map_err(|e| {
                    HandlerFailure::non_retryable(format!(
                        "invalid payload for {job_type}: {e}"
                    ))
                })?;
                // Handlers escalate a permanent failure by returning a
                // `HandlerFailure`; any other error is treated as transient.
                handler(payload, ctx).await.map_err(|e| {
                    match e.downcast::<HandlerFailure>() {
                        Ok(failure) => failure,
                        Err(e) => HandlerFailure::retryable(format!("{e:#}")),
                    }
                })
            })
        });

        if self
            .registrations
            .insert(job_type, JobRegistration { options, handler: boxed })
            .is_some()
        {
            warn!(job_type, "handler re-registered, replacing previous entry");
        }
    }

    pub fn lookup(&self, job_type: &str) -> Option<&JobRegistration> {
        self.registrations.get(job_type)
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.registrations.contains_key(job_type)
    }

    /// The enqueue-time attempt budget for a type, if registered.
    pub fn default_max_attempts(&self, job_type: &str) -> Option<i32> {
        self.registrations
            .get(job_type)
            .map(|r| r.options.default_max_attempts)
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        self.registrations.keys().copied().collect()
    }
}

/// Thread-safe registry handle shared by the store and worker pool.
pub type SharedJobRegistry = Arc<JobRegistry>;
