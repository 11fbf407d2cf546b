//! Execution context passed to job handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::kernel::ServerDeps;

/// Signals that the worker's lease on the running job has been lost.
///
/// The renewal companion trips this after the store reports a stale lease,
/// which also cancels the job's cancellation token. Handlers that checkpoint
/// externally-visible work should consult it before committing side effects.
#[derive(Clone, Debug, Default)]
pub struct LeaseToken {
    lost: CancellationToken,
}

impl LeaseToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the lease as lost. Called by the renewal companion only.
    pub(crate) fn mark_lost(&self) {
        self.lost.cancel();
    }

    pub fn is_lost(&self) -> bool {
        self.lost.is_cancelled()
    }

    /// Completes when the lease is lost.
    pub async fn lost(&self) {
        self.lost.cancelled().await;
    }
}

/// Immutable per-attempt context for a handler invocation.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub attempt: i32,
    pub payload: serde_json::Value,
    /// Cancelled on process shutdown or lease loss; handlers should observe it
    /// at their own suspension points.
    pub cancel: CancellationToken,
    pub lease: LeaseToken,
    pub deps: Arc<ServerDeps>,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
