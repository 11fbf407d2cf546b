pub mod health;
pub mod jobs;
pub mod schedules;

pub use health::health_handler;
pub use jobs::{
    cancel_job_handler, get_job_handler, job_stats_handler, list_jobs_handler, retry_job_handler,
};
pub use schedules::{
    create_schedule_handler, delete_schedule_handler, disable_schedule_handler,
    enable_schedule_handler, list_schedules_handler, patch_schedule_handler,
};
