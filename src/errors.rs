//! Typed error kinds shared across the backend.
//!
//! Raw technical detail is preserved on each variant; the tool dispatcher is
//! the only layer that turns these into user-facing text (via `translate`).

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Token absent or rejected by GitHub. One kind regardless of cause.
    #[error("not authenticated with GitHub")]
    NotAuthenticated,

    #[error("tier limit reached: {0}")]
    TierLimit(String),

    #[error("repository is not cloned locally")]
    NotCloned,

    #[error("invalid OAuth state")]
    InvalidOauthState,

    #[error("expired OAuth state")]
    ExpiredOauthState,

    #[error("GitHub authorization failed: {0}")]
    ProviderAuthFailed(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Raw git stderr, already credential-scrubbed by the driver.
    #[error("git: {0}")]
    Git(String),

    #[error("GitHub API error {status}: {message}")]
    GitHub { status: u16, message: String },

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Raw text handed to the error translator's pattern catalog.
    pub fn raw_text(&self) -> String {
        match self {
            AppError::Git(text) => text.clone(),
            AppError::GitHub { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status, when the error originated from the GitHub API.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AppError::GitHub { status, .. } => Some(*status),
            AppError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
