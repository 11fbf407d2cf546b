use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{middleware::Next, Json};
use serde_json::json;
use tracing::debug;

use crate::server::auth::JwtService;

/// Authenticated admin operator extracted from the bearer token.
#[derive(Clone, Debug)]
pub struct AdminUser {
    pub subject: String,
}

/// Admin authentication middleware.
///
/// Every route behind it requires a valid token with the admin flag; anything
/// else is 401. There is no anonymous tier on the admin surface.
pub async fn admin_auth_middleware(
    jwt_service: Arc<JwtService>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match extract_admin(&request, &jwt_service) {
        Some(admin) => {
            debug!(subject = %admin.subject, "admin authenticated");
            request.extensions_mut().insert(admin);
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "admin authentication required" })),
        )
            .into_response(),
    }
}

/// Extract and verify the bearer token, requiring the admin flag.
fn extract_admin(
    request: &axum::http::Request<axum::body::Body>,
    jwt_service: &JwtService,
) -> Option<AdminUser> {
    let auth_header = request.headers().get("authorization")?;
    let auth_str = auth_header.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str);

    let claims = jwt_service.verify_token(token).ok()?;
    if !claims.is_admin {
        return None;
    }

    Some(AdminUser {
        subject: claims.sub,
    })
}
