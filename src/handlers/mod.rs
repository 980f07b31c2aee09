//! OAuth callback HTTP listener: `GET /health` and `GET /oauth/callback`.
//!
//! This listener completes the browser leg of the OAuth flow. It shares the
//! process with the MCP stdio loop, so handlers log to stderr like
//! everything else.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::HealthResponse;
use crate::state::AppState;

// ── GET /health ─────────────────────────────────────────────────────────

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state.db.ping().await;
    let response = HealthResponse {
        status: if db_ok { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app: "gitflow-backend".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    Json(serde_json::to_value(response).unwrap_or_else(|_| json!({ "status": "degraded" })))
}

// ── GET /oauth/callback ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, Html<String>) {
    // The provider reports user-denied and misconfiguration cases as query
    // parameters rather than a code.
    if let Some(error) = &query.error {
        let description = query
            .error_description
            .as_deref()
            .unwrap_or("GitHub reported an error during sign-in.");
        tracing::warn!(%error, description, "OAuth callback returned an error");
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page("Sign-in didn't complete", description)),
        );
    }

    let (Some(code), Some(oauth_state)) = (&query.code, &query.state) else {
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page(
                "Missing parameters",
                "The callback is missing its code or state parameter. Start the sign-in again.",
            )),
        );
    };

    match state.auth.handle_callback(code, oauth_state).await {
        Ok(outcome) => (
            StatusCode::OK,
            Html(success_page(
                &outcome.user.username,
                &outcome.user.id.to_string(),
                outcome.is_new_user,
            )),
        ),
        Err(AppError::InvalidOauthState) => (
            StatusCode::BAD_REQUEST,
            Html(error_page(
                "Sign-in link invalid",
                "This sign-in link was already used or never existed. Start again from the assistant.",
            )),
        ),
        Err(AppError::ExpiredOauthState) => (
            StatusCode::BAD_REQUEST,
            Html(error_page(
                "Sign-in link expired",
                "This sign-in link expired. Start again from the assistant — links are valid for a few minutes.",
            )),
        ),
        Err(AppError::ProviderAuthFailed(reason)) => {
            tracing::warn!(%reason, "provider rejected the code exchange");
            (
                StatusCode::UNAUTHORIZED,
                Html(error_page(
                    "GitHub didn't accept the sign-in",
                    "GitHub rejected the authorization. Start the sign-in again.",
                )),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "OAuth callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(error_page(
                    "Something went wrong",
                    "An unexpected error interrupted the sign-in. Try again in a moment.",
                )),
            )
        }
    }
}

// ── Fallback ────────────────────────────────────────────────────────────

pub async fn not_found() -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        Html(error_page(
            "Page not found",
            "There's nothing at this address. The sign-in page is at /oauth/callback.",
        )),
    )
}

// ── HTML pages ──────────────────────────────────────────────────────────

const PAGE_STYLE: &str = "\
    body { font-family: -apple-system, 'Segoe UI', sans-serif; background: #0d1117; \
           color: #e6edf3; display: flex; justify-content: center; padding-top: 12vh; } \
    .card { background: #161b22; border: 1px solid #30363d; border-radius: 12px; \
            padding: 2.5rem 3rem; max-width: 30rem; text-align: center; } \
    h1 { font-size: 1.4rem; } p { color: #9198a1; line-height: 1.5; } \
    code { background: #21262d; padding: 0.2rem 0.5rem; border-radius: 6px; \
           color: #79c0ff; user-select: all; }";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
         <title>{title} — GitFlow</title><style>{PAGE_STYLE}</style></head>\
         <body><div class=\"card\">{body}</div></body></html>"
    )
}

fn success_page(username: &str, user_id: &str, is_new_user: bool) -> String {
    let greeting = if is_new_user {
        "Welcome aboard"
    } else {
        "Welcome back"
    };
    page(
        "Signed in",
        &format!(
            "<h1>✅ {greeting}, {username}!</h1>\
             <p>You're signed in to GitHub. You can close this tab and go back \
             to your assistant.</p>\
             <p>Your user id — keep it, your assistant will ask for it:</p>\
             <p><code>{user_id}</code></p>"
        ),
    )
}

fn error_page(title: &str, description: &str) -> String {
    page(
        title,
        &format!("<h1>⚠️ {title}</h1><p>{description}</p>"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_page_shows_username_and_id() {
        let html = success_page("octocat", "123e4567-e89b-12d3-a456-426614174000", true);
        assert!(html.contains("octocat"));
        assert!(html.contains("123e4567-e89b-12d3-a456-426614174000"));
        assert!(html.contains("Welcome aboard"));
    }

    #[test]
    fn returning_user_greeting() {
        let html = success_page("octocat", "id", false);
        assert!(html.contains("Welcome back"));
    }

    #[test]
    fn error_page_carries_description() {
        let html = error_page("Sign-in link expired", "Start again.");
        assert!(html.contains("Sign-in link expired"));
        assert!(html.contains("Start again."));
    }
}
