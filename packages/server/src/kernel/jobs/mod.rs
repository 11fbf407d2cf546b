//! Durable job queue and in-process scheduler.
//!
//! This module is the kernel of background processing:
//! - [`JobStore`] - transactional persistence: claim, lease, complete, fail
//! - [`JobRegistry`] - job type names mapped to handlers
//! - [`WorkerPool`] - claim loops with lease renewal
//! - [`Scheduler`] - advances due cron schedules into jobs
//! - [`RecoverySweeper`] - resets leases abandoned by dead workers
//! - [`JobService`] - lifecycle facade and admin surface
//!
//! # Architecture
//!
//! ```text
//! Scheduler (tick)
//!     └─► Store.advance_schedule_and_enqueue (row lock, de-duped)
//!             └─► jobs row: queued
//!
//! Worker (per task)
//!     ├─► Store.claim (FOR UPDATE SKIP LOCKED, single row)
//!     ├─► renewal companion (lease heartbeat)
//!     ├─► Registry handler (typed payload, deadline, panic containment)
//!     └─► Store.complete / Store.fail (backoff re-queue or terminal)
//!
//! RecoverySweeper (tick)
//!     └─► Store.recover_stalled (expired leases back to queued)
//! ```
//!
//! All coordination lives in Postgres row locks; no in-process lock is held
//! across a database call, and concurrent processes are safe by construction.

mod backoff;
mod context;
mod error;
mod job;
mod registry;
mod schedule;
mod scheduler;
mod service;
mod store;
mod sweeper;
mod worker;

pub use backoff::Backoff;
pub use context::{JobContext, LeaseToken};
pub use error::{JobError, JobResult};
pub use job::{Job, JobState, NewJob};
pub use registry::{
    FailureKind, HandlerFailure, JobOptions, JobRegistry, SharedJobRegistry,
};
pub use schedule::{
    next_occurrence, validate_cron_expr, NewSchedule, Schedule, ScheduleUpdate,
};
pub use scheduler::Scheduler;
pub use service::{JobService, JobServiceHandle};
pub use store::{
    Ack, FailOutcome, JobFilter, JobPage, JobStats, JobStore, ScheduleAdvance,
};
pub use sweeper::RecoverySweeper;
pub use worker::{WorkerPool, WorkerPoolConfig};
