//! Maintenance jobs: auth table cleanup and materialized view refresh.

pub mod jobs;

pub use jobs::register_maintenance_jobs;
