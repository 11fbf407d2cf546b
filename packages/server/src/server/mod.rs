//! HTTP surface: router, admin auth, and route handlers.

pub mod app;
pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;

pub use app::{build_router, AppState};
pub use auth::JwtService;
