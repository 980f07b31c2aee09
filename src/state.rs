//! Application state composition.
//!
//! One instance of each service is constructed here and passed down as a
//! handle; no global state survives outside this struct.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Db;
use crate::errors::AppResult;
use crate::git::GitDriver;
use crate::github::GitHubClient;
use crate::models::User;
use crate::repos::RepoStore;
use crate::secrets::SecretStore;
use crate::sessions::SessionService;
use crate::translate::ErrorTranslator;

// ── Per-path git serialization ──────────────────────────────────────────

/// The working tree at a local path is a global resource; all git operations
/// against the same path run under one async mutex. Different paths proceed
/// in parallel.
#[derive(Default)]
pub struct RepoLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl std::fmt::Debug for RepoLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLocks").finish_non_exhaustive()
    }
}

// ── AppState ────────────────────────────────────────────────────────────

/// Central application state. Clone-friendly — everything inside is an Arc
/// or otherwise cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Db,
    pub http_client: reqwest::Client,
    pub secrets: Arc<SecretStore>,
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionService>,
    pub repos: Arc<RepoStore>,
    pub github: Arc<GitHubClient>,
    pub translator: Arc<ErrorTranslator>,
    pub repo_locks: Arc<RepoLocks>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, db: Db) -> Self {
        let config = Arc::new(config);

        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        let secrets = Arc::new(SecretStore::new(
            db.clone(),
            &config.security.keychain_service,
            &config.jwt.secret,
        ));
        let auth = Arc::new(AuthService::new(
            db.clone(),
            secrets.clone(),
            http_client.clone(),
            config.clone(),
        ));
        let sessions = Arc::new(SessionService::new(db.clone()));
        let repos = Arc::new(RepoStore::new(db.clone()));
        let github = Arc::new(GitHubClient::new(http_client.clone()));

        Self {
            config,
            db,
            http_client,
            secrets,
            auth,
            sessions,
            repos,
            github,
            translator: Arc::new(ErrorTranslator::new()),
            repo_locks: Arc::new(RepoLocks::new()),
            start_time: Instant::now(),
        }
    }

    /// Test-only constructor — uses a lazy pool so no real database is
    /// needed for endpoints that don't issue SQL (or that handle DB errors).
    #[doc(hidden)]
    pub fn new_test() -> Self {
        let config = Config {
            app: crate::config::AppConfig {
                env: "test".into(),
                port: 3000,
                log_level: "debug".into(),
            },
            database: crate::config::DatabaseConfig {
                url: "postgres://test@localhost:19999/test".into(),
                pool_min: 1,
                pool_max: 2,
            },
            github: crate::config::GitHubConfig {
                client_id: "test-client-id".into(),
                client_secret: "test-client-secret".into(),
                redirect_uri: "http://localhost:3000/oauth/callback".into(),
            },
            redis: crate::config::RedisConfig {
                url: "redis://localhost".into(),
                ttl_seconds: 300,
            },
            jwt: crate::config::JwtConfig {
                secret: "test-jwt-secret".into(),
                expires_in: "7d".into(),
                issuer: "gitflow-backend".into(),
            },
            security: crate::config::SecurityConfig {
                keychain_service: "gitflow-test".into(),
                oauth_state_ttl_seconds: 300,
            },
            stripe: crate::config::StripeConfig::default(),
        };
        Self::new(config, Db::connect_lazy_test())
    }

    /// Git driver for one user's working tree. Callers must hold the
    /// per-path lock (`repo_locks`) around mutating operations.
    pub fn git_driver(&self, user: &User, local_path: &Path) -> GitDriver {
        GitDriver::new(local_path, &user.token_account_key(), self.secrets.clone())
    }

    /// Repair any credentialed remote URLs left behind by a crash. Runs at
    /// startup over every cloned repository row.
    pub async fn scrub_stale_credentials(&self) -> AppResult<()> {
        let repositories = self.repos.all_cloned().await?;
        for repo in repositories {
            let Some(local_path) = &repo.local_path else {
                continue;
            };
            let path = Path::new(local_path);
            if !path.join(".git").exists() {
                continue;
            }
            if let Err(e) = GitDriver::scrub_path(path).await {
                tracing::warn!(path = %local_path, error = %e, "startup credential scrub failed");
            }
        }
        Ok(())
    }
}
