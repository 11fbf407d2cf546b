// Kernel - core infrastructure.
//
// Everything here is INFRASTRUCTURE, not business logic: the jobs subsystem,
// shared dependencies, and the legacy webhook pruner. Job handlers with
// domain behavior live in domains/*.

pub mod deps;
pub mod jobs;
pub mod webhook_pruner;

pub use deps::ServerDeps;
