//! Background maintenance jobs.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::kernel::jobs::{HandlerFailure, JobContext, JobOptions, JobRegistry};

/// Delete expired auth sessions and stale OAuth handshake state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupAuthJob {}

impl CleanupAuthJob {
    pub const JOB_TYPE: &'static str = "cleanup_auth";
}

/// Refresh a materialized view by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshMaterializedViewJob {
    pub view: String,
}

impl RefreshMaterializedViewJob {
    pub const JOB_TYPE: &'static str = "refresh_materialized_view";
}

/// No-op job used by smoke tests and deployment checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoopJob {}

impl NoopJob {
    pub const JOB_TYPE: &'static str = "noop";
}

/// Handle `cleanup_auth`.
///
/// OAuth handshake rows are abandoned after an hour; sessions carry their own
/// expiry.
pub async fn handle_cleanup_auth(_job: CleanupAuthJob, ctx: JobContext) -> Result<()> {
    let now = Utc::now();

    let sessions = sqlx::query("DELETE FROM auth_sessions WHERE expires_at < $1")
        .bind(now)
        .execute(&ctx.deps.db)
        .await?
        .rows_affected();

    let oauth_states = sqlx::query("DELETE FROM oauth_states WHERE created_at < $1")
        .bind(now - chrono::Duration::hours(1))
        .execute(&ctx.deps.db)
        .await?
        .rows_affected();

    if sessions + oauth_states > 0 {
        info!(sessions, oauth_states, "cleaned up expired auth rows");
    }
    Ok(())
}

/// Handle `refresh_materialized_view`.
///
/// The view name is interpolated into DDL, so anything that is not a plain
/// (optionally schema-qualified) identifier is rejected as permanent.
pub async fn handle_refresh_materialized_view(
    job: RefreshMaterializedViewJob,
    ctx: JobContext,
) -> Result<()> {
    if !is_valid_view_name(&job.view) {
        return Err(anyhow::Error::new(HandlerFailure::non_retryable(format!(
            "invalid materialized view name: {:?}",
            job.view
        ))));
    }

    let sql = format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {}", job.view);
    sqlx::query(&sql).execute(&ctx.deps.db).await?;

    info!(view = %job.view, "refreshed materialized view");
    Ok(())
}

pub async fn handle_noop(_job: NoopJob, _ctx: JobContext) -> Result<()> {
    Ok(())
}

/// Plain identifier, optionally schema-qualified.
fn is_valid_view_name(name: &str) -> bool {
    let mut parts = name.split('.');
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), None, _) => valid_part(first),
        (Some(first), Some(second), None) => valid_part(first) && valid_part(second),
        _ => false,
    }
}

/// Register the maintenance job types.
pub fn register_maintenance_jobs(registry: &mut JobRegistry) {
    registry.register::<CleanupAuthJob, _, _>(
        CleanupAuthJob::JOB_TYPE,
        JobOptions::with_timeout(Duration::from_secs(60)),
        handle_cleanup_auth,
    );
    registry.register::<RefreshMaterializedViewJob, _, _>(
        RefreshMaterializedViewJob::JOB_TYPE,
        JobOptions::with_timeout(Duration::from_secs(600)),
        handle_refresh_materialized_view,
    );
    registry.register::<NoopJob, _, _>(
        NoopJob::JOB_TYPE,
        JobOptions::default(),
        handle_noop,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_names_are_validated() {
        assert!(is_valid_view_name("daily_rollup"));
        assert!(is_valid_view_name("analytics.daily_rollup"));
        assert!(is_valid_view_name("_private"));

        assert!(!is_valid_view_name(""));
        assert!(!is_valid_view_name("1view"));
        assert!(!is_valid_view_name("a.b.c"));
        assert!(!is_valid_view_name("rollup; DROP TABLE jobs"));
        assert!(!is_valid_view_name("rollup name"));
    }

    #[test]
    fn registration_covers_all_types() {
        let mut registry = JobRegistry::new();
        register_maintenance_jobs(&mut registry);
        assert!(registry.is_registered(CleanupAuthJob::JOB_TYPE));
        assert!(registry.is_registered(RefreshMaterializedViewJob::JOB_TYPE));
        assert!(registry.is_registered(NoopJob::JOB_TYPE));
    }
}
