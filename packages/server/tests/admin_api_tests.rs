//! Admin HTTP API: auth gating, wire shapes, and status codes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use common::TestHarness;
use http_body_util::BodyExt;
use server_core::kernel::jobs::NewJob;
use server_core::server::{build_router, AppState, JwtService};
use test_context::test_context;
use tower::ServiceExt;

const TEST_SECRET: &str = "test-admin-secret";

fn test_app(harness: &TestHarness) -> (Router, String) {
    let jwt_service = JwtService::new(TEST_SECRET);
    let token = jwt_service.create_token("ops", true).unwrap();
    let app = build_router(
        AppState {
            jobs: harness.service(),
            db_pool: harness.db_pool.clone(),
        },
        Arc::new(jwt_service),
    );
    (app, token)
}

fn authed(token: &str, method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn authed_json(token: &str, method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn admin_routes_require_admin_auth(harness: &mut TestHarness) {
    let (app, _token) = test_app(harness);

    // No token.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Valid token without the admin flag.
    let non_admin = JwtService::new(TEST_SECRET).create_token("user", false).unwrap();
    let response = app
        .clone()
        .oneshot(authed(&non_admin, "GET", "/api/admin/jobs"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Garbage token.
    let response = app
        .oneshot(authed("not-a-token", "GET", "/api/admin/jobs/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn health_is_public(harness: &mut TestHarness) {
    let (app, _token) = test_app(harness);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn job_listing_shape_and_filters(harness: &mut TestHarness) {
    let store = harness.store();
    for _ in 0..3 {
        store.enqueue(NewJob::new("noop")).await.unwrap();
    }

    let (app, token) = test_app(harness);
    let response = app
        .clone()
        .oneshot(authed(&token, "GET", "/api/admin/jobs?state=queued&page=1&perPage=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["page"], 1);
    assert_eq!(body["perPage"], 2);
    assert_eq!(body["totalItems"], 3);
    assert_eq!(body["totalPages"], 2);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["type"], "noop");
    assert_eq!(items[0]["state"], "queued");
    assert!(items[0].get("payload").is_some());

    // Unknown state value is a 400, not a 500.
    let response = app
        .oneshot(authed(&token, "GET", "/api/admin/jobs?state=bogus"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn get_job_returns_404_for_missing(harness: &mut TestHarness) {
    let (app, token) = test_app(harness);
    let response = app
        .oneshot(authed(
            &token,
            "GET",
            &format!("/api/admin/jobs/{}", uuid::Uuid::now_v7()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn retry_and_cancel_conflict_on_wrong_states(harness: &mut TestHarness) {
    let store = harness.store();
    let job = store.enqueue(NewJob::new("noop")).await.unwrap();

    let (app, token) = test_app(harness);

    // Queued job: retry conflicts, cancel succeeds.
    let response = app
        .clone()
        .oneshot(authed(&token, "POST", &format!("/api/admin/jobs/{}/retry", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(authed(&token, "POST", &format!("/api/admin/jobs/{}/cancel", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["state"], "canceled");

    // Canceled job: cancel now conflicts.
    let response = app
        .oneshot(authed(&token, "POST", &format!("/api/admin/jobs/{}/cancel", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn retry_resets_failed_job(harness: &mut TestHarness) {
    let store = harness.store();
    let job = store
        .enqueue(NewJob::builder().job_type("noop").max_attempts(1).build())
        .await
        .unwrap();
    store
        .claim("worker-a", Duration::from_secs(5), Utc::now())
        .await
        .unwrap()
        .unwrap();
    store.fail(job.id, "worker-a", "boom", Utc::now()).await.unwrap();

    let (app, token) = test_app(harness);
    let response = app
        .oneshot(authed(&token, "POST", &format!("/api/admin/jobs/{}/retry", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["state"], "queued");
    assert_eq!(body["attempts"], 0);
    assert_eq!(body["lastError"], "boom");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn stats_shape(harness: &mut TestHarness) {
    let store = harness.store();
    store.enqueue(NewJob::new("noop")).await.unwrap();

    let (app, token) = test_app(harness);
    let response = app
        .oneshot(authed(&token, "GET", "/api/admin/jobs/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["queued"], 1);
    assert_eq!(body["running"], 0);
    assert_eq!(body["completed"], 0);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["canceled"], 0);
    assert!(body["oldestQueuedAgeSec"].as_i64().unwrap() >= 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn schedule_crud_over_http(harness: &mut TestHarness) {
    let (app, token) = test_app(harness);

    // Create.
    let response = app
        .clone()
        .oneshot(authed_json(
            &token,
            "POST",
            "/api/admin/schedules",
            serde_json::json!({
                "name": "nightly-noop",
                "type": "noop",
                "cronExpr": "0 2 * * *",
                "payload": {},
                "maxAttempts": 2
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["type"], "noop");
    assert_eq!(created["cronExpr"], "0 2 * * *");
    assert_eq!(created["enabled"], true);
    let id = created["id"].as_str().unwrap().to_string();

    // Invalid cron is a 400.
    let response = app
        .clone()
        .oneshot(authed_json(
            &token,
            "POST",
            "/api/admin/schedules",
            serde_json::json!({ "name": "broken", "type": "noop", "cronExpr": "nope" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Duplicate name is a 409.
    let response = app
        .clone()
        .oneshot(authed_json(
            &token,
            "POST",
            "/api/admin/schedules",
            serde_json::json!({ "name": "nightly-noop", "type": "noop", "cronExpr": "0 2 * * *" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Patch.
    let response = app
        .clone()
        .oneshot(authed_json(
            &token,
            "PATCH",
            &format!("/api/admin/schedules/{id}"),
            serde_json::json!({ "maxAttempts": 4 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["maxAttempts"], 4);

    // Disable / enable.
    let response = app
        .clone()
        .oneshot(authed(&token, "POST", &format!("/api/admin/schedules/{id}/disable")))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["enabled"], false);

    let response = app
        .clone()
        .oneshot(authed(&token, "POST", &format!("/api/admin/schedules/{id}/enable")))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["enabled"], true);

    // List includes it.
    let response = app
        .clone()
        .oneshot(authed(&token, "GET", "/api/admin/schedules"))
        .await
        .unwrap();
    let schedules = json_body(response).await;
    assert!(schedules
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["name"] == "nightly-noop"));

    // Delete.
    let response = app
        .clone()
        .oneshot(authed(&token, "DELETE", &format!("/api/admin/schedules/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(authed(&token, "DELETE", &format!("/api/admin/schedules/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
