// pgbase - API core
//
// This crate provides the backend core for pgbase: the durable job queue and
// in-process scheduler, its built-in job handlers, and the admin HTTP surface
// used to operate them.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
