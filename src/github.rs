//! Typed GitHub REST client with rate-limit awareness.
//!
//! Every request carries the standard GitHub headers and a 10-second
//! timeout. Failures become `AppError::GitHub { status, message }` with the
//! remote body preserved (never the token).

use std::time::Duration;

use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::models::{GitHubPullRequest, GitHubRepo, GitHubUser};

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "gitflow-backend/1.0";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Warn when fewer than this many core-API requests remain in the window.
const RATE_LIMIT_WARN_THRESHOLD: i64 = 50;

#[derive(Debug, Clone, Default)]
pub struct RepoListQuery {
    pub page: u32,
    pub per_page: u32,
    pub sort: String,
    pub org: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub remaining: i64,
    pub limit: i64,
    pub reset_epoch: i64,
}

pub struct GitHubClient {
    http: reqwest::Client,
    base: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base: GITHUB_API_BASE.to_string(),
        }
    }

    /// Override the API base, for tests against a local stub.
    #[doc(hidden)]
    pub fn with_base(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into(),
        }
    }

    // ── Users ───────────────────────────────────────────────────────────

    pub async fn get_user(&self, token: &str) -> AppResult<GitHubUser> {
        let value = self.get(token, "/user").await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("unexpected /user payload: {e}")))
    }

    // ── Repositories ────────────────────────────────────────────────────

    pub async fn list_repos(&self, token: &str, query: &RepoListQuery) -> AppResult<Vec<GitHubRepo>> {
        let per_page = query.per_page.clamp(1, 100);
        let page = query.page.max(1);
        let sort = match query.sort.as_str() {
            "created" | "updated" | "pushed" | "full_name" => query.sort.as_str(),
            _ => "updated",
        };

        let path = match &query.org {
            Some(org) => format!("/orgs/{org}/repos?sort={sort}&per_page={per_page}&page={page}"),
            None => format!("/user/repos?sort={sort}&per_page={per_page}&page={page}"),
        };

        let value = self.get(token, &path).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("unexpected repo list payload: {e}")))
    }

    pub async fn get_repo(&self, token: &str, owner: &str, name: &str) -> AppResult<GitHubRepo> {
        let value = self.get(token, &format!("/repos/{owner}/{name}")).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("unexpected repo payload: {e}")))
    }

    // ── Pull requests ───────────────────────────────────────────────────

    pub async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
        draft: bool,
    ) -> AppResult<GitHubPullRequest> {
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
            "draft": draft,
        });
        let value = self
            .post(token, &format!("/repos/{owner}/{repo}/pulls"), &payload)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("unexpected pull request payload: {e}")))
    }

    /// The open PR whose head is `branch`, if one exists.
    pub async fn find_open_pr(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> AppResult<Option<GitHubPullRequest>> {
        let path = format!("/repos/{owner}/{repo}/pulls?state=open&head={owner}:{branch}");
        let value = self.get(token, &path).await?;
        let prs: Vec<GitHubPullRequest> = serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("unexpected pull list payload: {e}")))?;
        Ok(prs.into_iter().next())
    }

    // ── Rate limit ──────────────────────────────────────────────────────

    pub async fn get_rate_limit(&self, token: &str) -> AppResult<RateLimitInfo> {
        let value = self.get(token, "/rate_limit").await?;
        let core = &value["resources"]["core"];
        Ok(RateLimitInfo {
            remaining: core["remaining"].as_i64().unwrap_or(0),
            limit: core["limit"].as_i64().unwrap_or(0),
            reset_epoch: core["reset"].as_i64().unwrap_or(0),
        })
    }

    // ── HTTP plumbing ───────────────────────────────────────────────────

    async fn get(&self, token: &str, path: &str) -> AppResult<Value> {
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .header("authorization", format!("Bearer {token}"))
            .header("accept", "application/vnd.github+json")
            .header("user-agent", USER_AGENT)
            .header("x-github-api-version", API_VERSION)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::unwrap_response(response).await
    }

    async fn post(&self, token: &str, path: &str, body: &Value) -> AppResult<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .header("authorization", format!("Bearer {token}"))
            .header("accept", "application/vnd.github+json")
            .header("user-agent", USER_AGENT)
            .header("x-github-api-version", API_VERSION)
            .json(body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::unwrap_response(response).await
    }

    async fn unwrap_response(response: reqwest::Response) -> AppResult<Value> {
        Self::observe_rate_limit(&response);

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::NotAuthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or(body);
            return Err(AppError::GitHub {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    fn observe_rate_limit(response: &reqwest::Response) {
        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());
        if let Some(remaining) = remaining {
            if remaining < RATE_LIMIT_WARN_THRESHOLD {
                let reset = response
                    .headers()
                    .get("x-ratelimit-reset")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("?")
                    .to_string();
                tracing::warn!(remaining, %reset, "GitHub rate limit running low");
            }
        }
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient").field("base", &self.base).finish()
    }
}
