pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod git;
pub mod github;
pub mod handlers;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod policy;
pub mod repos;
pub mod secrets;
pub mod sessions;
pub mod state;
pub mod tools;
pub mod translate;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the OAuth callback router with the given shared state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/oauth/callback", get(handlers::oauth_callback))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
