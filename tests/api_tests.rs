use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use gitflow_backend::state::AppState;

/// Helper: build a fresh callback-server router with a clean test AppState.
/// Uses a lazy pool — no real database connection required.
fn app() -> axum::Router {
    let state = AppState::new_test();
    gitflow_backend::create_router(state)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

// ═══════════════════════════════════════════════════════════════════════════
//  GET /health
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_returns_200() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_has_liveness_fields() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    // The lazy test pool can't reach a database, so the service reports
    // degraded — but it reports.
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["app"], "gitflow-backend");
    assert!(json["uptime_seconds"].is_u64());
    assert!(json["version"].is_string());
}

// ═══════════════════════════════════════════════════════════════════════════
//  GET /oauth/callback
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn callback_with_provider_error_is_400_html() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/oauth/callback?error=access_denied&error_description=The+user+denied+access")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_string(response).await;
    assert!(html.contains("<!doctype html>"));
    assert!(html.contains("The user denied access"));
}

#[tokio::test]
async fn callback_without_parameters_is_400() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/oauth/callback")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_string(response).await;
    assert!(html.contains("Missing parameters"));
}

#[tokio::test]
async fn callback_with_unknown_state_is_400() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/oauth/callback?code=abc123&state=never-issued")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // The state was never issued, so the flow fails before any network or
    // database access.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_string(response).await;
    assert!(html.contains("already used or never existed"));
}

// ═══════════════════════════════════════════════════════════════════════════
//  404 for unknown routes
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unknown_route_returns_404_html() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/definitely/not/here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let html = body_string(response).await;
    assert!(html.contains("Page not found"));
}
