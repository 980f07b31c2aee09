use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Tier ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn from_str_or_free(s: &str) -> Self {
        match s {
            "pro" => Tier::Pro,
            "enterprise" => Tier::Enterprise,
            _ => Tier::Free,
        }
    }
}

/// Per-tier usage gates. `max_repos` bounds `clone_and_setup_repo`; for free
/// users it also trims the `list_repositories` display.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierLimits {
    pub commits_per_month: i64,
    pub prs_per_month: i64,
    pub max_repos: i64,
    pub team_features: bool,
}

impl TierLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                commits_per_month: 100,
                prs_per_month: 10,
                max_repos: 5,
                team_features: false,
            },
            Tier::Pro => Self {
                commits_per_month: 2_000,
                prs_per_month: 200,
                max_repos: 50,
                team_features: false,
            },
            Tier::Enterprise => Self {
                commits_per_month: i64::MAX,
                prs_per_month: i64::MAX,
                max_repos: i64::MAX,
                team_features: true,
            },
        }
    }
}

// ── Token column sentinels ──────────────────────────────────────────────

/// `users.github_token_encrypted` holds either AES-GCM ciphertext
/// (`enc:<base64>`) or one of these literals.
pub const TOKEN_IN_KEYCHAIN: &str = "STORED_IN_KEYCHAIN";
pub const TOKEN_LOGGED_OUT: &str = "LOGGED_OUT";
pub const TOKEN_REDACTED: &str = "REDACTED";

// ── DB row types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: uuid::Uuid,
    pub github_id: i64,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub tier: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub subscription_renews_at: Option<DateTime<Utc>>,
    pub commits_this_month: i64,
    pub prs_this_month: i64,
    pub repos_accessed_total: i64,
    pub usage_last_reset_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub github_token_encrypted: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn tier(&self) -> Tier {
        Tier::from_str_or_free(&self.tier)
    }

    /// Keychain account key for this user's GitHub access token.
    pub fn token_account_key(&self) -> String {
        format!("github_{}", self.github_id)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Repository {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub github_repo_id: i64,
    pub owner: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub local_path: Option<String>,
    pub is_cloned: bool,
    pub cloned_at: Option<DateTime<Utc>>,
    pub current_branch: Option<String>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub repository_id: uuid::Uuid,
    pub task_description: Option<String>,
    pub current_branch: String,
    pub pr_id: Option<i64>,
    pub pr_number: Option<i32>,
    pub pr_url: Option<String>,
    pub pr_created_at: Option<DateTime<Utc>>,
    pub pr_merged_at: Option<DateTime<Utc>>,
    pub commits_count: i32,
    pub last_action: Option<String>,
    pub last_action_at: Option<DateTime<Utc>>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

// ── GitHub API views ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub clone_url: String,
    pub default_branch: Option<String>,
    pub private: bool,
    pub owner: GitHubRepoOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepoOwner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubPullRequest {
    pub id: i64,
    pub number: i32,
    pub html_url: String,
    pub title: String,
    pub state: String,
    pub created_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

// ── Health ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub app: String,
    pub uptime_seconds: u64,
}
