//! GitHub OAuth flow, credential lifecycle, and session JWTs.
//!
//! The OAuth state map is in-memory only: a cryptographically random token
//! maps to `{created_at, redirect_uri}`, is used exactly once, and expires
//! after the configured TTL. A background sweeper clears expired entries
//! every minute.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::{Db, Tx};
use crate::errors::{AppError, AppResult};
use crate::models::{User, TOKEN_REDACTED};
use crate::secrets::SecretStore;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ── OAuth state ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PendingOAuth {
    created_at: Instant,
    redirect_uri: String,
}

type StateMap = Arc<RwLock<HashMap<String, PendingOAuth>>>;

#[derive(Debug, Clone, Serialize)]
pub struct OAuthInitiation {
    pub url: String,
    pub state: String,
    pub expires_in: u64,
}

#[derive(Debug)]
pub struct CallbackOutcome {
    pub user: User,
    pub session_token: String,
    pub is_new_user: bool,
}

// ── JWT payload ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: uuid::Uuid,
    pub github_id: i64,
    pub username: String,
    pub tier: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
}

// ── Service ─────────────────────────────────────────────────────────────

pub struct AuthService {
    db: Db,
    secrets: Arc<SecretStore>,
    http: reqwest::Client,
    config: Arc<Config>,
    states: StateMap,
}

impl AuthService {
    pub fn new(
        db: Db,
        secrets: Arc<SecretStore>,
        http: reqwest::Client,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            secrets,
            http,
            config,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // ── OAuth initiation ────────────────────────────────────────────────

    pub async fn initiate_oauth(&self, redirect_uri: Option<String>) -> OAuthInitiation {
        let state = {
            let bytes: [u8; 32] = rand::random();
            hex::encode(bytes)
        };
        let redirect_uri = redirect_uri.unwrap_or_else(|| self.config.github.redirect_uri.clone());

        self.states.write().await.insert(
            state.clone(),
            PendingOAuth {
                created_at: Instant::now(),
                redirect_uri: redirect_uri.clone(),
            },
        );

        let mut auth_url =
            url::Url::parse(GITHUB_AUTHORIZE_URL).expect("GITHUB_AUTHORIZE_URL is a valid hardcoded URL");
        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &self.config.github.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("scope", &self.config.github_scopes())
            .append_pair("state", &state)
            .append_pair("allow_signup", "true");

        tracing::info!("OAuth flow initiated");
        OAuthInitiation {
            url: auth_url.to_string(),
            state,
            expires_in: self.config.security.oauth_state_ttl_seconds,
        }
    }

    /// Atomic test-and-remove: a state token is consumed exactly once.
    async fn take_state(&self, state: &str) -> AppResult<String> {
        let pending = self
            .states
            .write()
            .await
            .remove(state)
            .ok_or(AppError::InvalidOauthState)?;
        let ttl = Duration::from_secs(self.config.security.oauth_state_ttl_seconds);
        if pending.created_at.elapsed() > ttl {
            return Err(AppError::ExpiredOauthState);
        }
        Ok(pending.redirect_uri)
    }

    // ── Callback ────────────────────────────────────────────────────────

    pub async fn handle_callback(&self, code: &str, state: &str) -> AppResult<CallbackOutcome> {
        let redirect_uri = self.take_state(state).await?;
        let access_token = self.exchange_code(code, &redirect_uri).await?;

        let github = crate::github::GitHubClient::new(self.http.clone());
        let profile = github.get_user(&access_token).await?;

        let (user, is_new_user) = self.upsert_user(&profile).await?;
        self.secrets
            .put(&user.token_account_key(), &access_token)
            .await?;

        let session_token = self.mint_session_token(&user)?;
        tracing::info!(username = %user.username, is_new_user, "OAuth callback complete");

        Ok(CallbackOutcome {
            user,
            session_token,
            is_new_user,
        })
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<String> {
        let response = self
            .http
            .post(GITHUB_TOKEN_URL)
            .header("accept", "application/json")
            .json(&json!({
                "client_id": self.config.github.client_id,
                "client_secret": self.config.github.client_secret,
                "code": code,
                "redirect_uri": redirect_uri,
            }))
            .timeout(HTTP_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(AppError::ProviderAuthFailed(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        // GitHub reports failures as a body-level `error` field on HTTP 200.
        let body: Value = response.json().await?;
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            let description = body
                .get("error_description")
                .and_then(|d| d.as_str())
                .unwrap_or(error);
            return Err(AppError::ProviderAuthFailed(description.to_string()));
        }

        body.get("access_token")
            .and_then(|t| t.as_str())
            .map(String::from)
            .ok_or_else(|| AppError::ProviderAuthFailed("response carried no access_token".into()))
    }

    /// Transactional find-for-update + insert-or-update keyed on github_id.
    async fn upsert_user(&self, profile: &crate::models::GitHubUser) -> AppResult<(User, bool)> {
        let email = profile
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", profile.login));
        let profile = profile.clone();

        self.db
            .transaction(move |tx| {
                async move {
                    let existing = sqlx::query_as::<_, User>(
                        "SELECT * FROM users WHERE github_id = $1 AND deleted_at IS NULL FOR UPDATE",
                    )
                    .bind(profile.id)
                    .fetch_optional(&mut **tx)
                    .await?;

                    match existing {
                        Some(user) => {
                            reset_usage_if_new_month(tx, &user).await?;
                            let updated = sqlx::query_as::<_, User>(
                                "UPDATE users SET username = $2, email = $3, display_name = $4, \
                                 avatar_url = $5, last_login_at = NOW(), updated_at = NOW() \
                                 WHERE id = $1 RETURNING *",
                            )
                            .bind(user.id)
                            .bind(&profile.login)
                            .bind(&email)
                            .bind(&profile.name)
                            .bind(&profile.avatar_url)
                            .fetch_one(&mut **tx)
                            .await?;
                            Ok((updated, false))
                        }
                        None => {
                            let created = sqlx::query_as::<_, User>(
                                "INSERT INTO users (id, github_id, username, email, display_name, \
                                 avatar_url, tier, last_login_at) \
                                 VALUES ($1, $2, $3, $4, $5, $6, 'free', NOW()) RETURNING *",
                            )
                            .bind(uuid::Uuid::new_v4())
                            .bind(profile.id)
                            .bind(&profile.login)
                            .bind(&email)
                            .bind(&profile.name)
                            .bind(&profile.avatar_url)
                            .fetch_one(&mut **tx)
                            .await?;
                            Ok((created, true))
                        }
                    }
                }
                .boxed()
            })
            .await
    }

    // ── Session JWTs ────────────────────────────────────────────────────

    pub fn mint_session_token(&self, user: &User) -> AppResult<String> {
        let now = chrono::Utc::now().timestamp();
        let lifetime = crate::config::parse_expiry(&self.config.jwt.expires_in)?;
        let claims = SessionClaims {
            sub: user.id,
            github_id: user.github_id,
            username: user.username.clone(),
            tier: user.tier.clone(),
            iss: self.config.jwt.issuer.clone(),
            iat: now,
            exp: now + lifetime,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt.secret.as_bytes()),
        )?)
    }

    pub fn verify_session_token(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.jwt.issuer]);
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .ok()
    }

    /// Token is well-formed, unexpired, AND its user still exists.
    pub async fn validate_token(&self, token: &str) -> bool {
        let Some(claims) = self.verify_session_token(token) else {
            return false;
        };
        matches!(self.find_user(claims.sub).await, Ok(Some(_)))
    }

    pub async fn get_user_from_session(&self, token: &str) -> AppResult<User> {
        let claims = self
            .verify_session_token(token)
            .ok_or(AppError::NotAuthenticated)?;
        self.find_user(claims.sub)
            .await?
            .ok_or(AppError::NotAuthenticated)
    }

    /// Re-issue a JWT for a still-valid user without re-authenticating.
    pub async fn refresh_session(&self, token: &str) -> AppResult<String> {
        let user = self.get_user_from_session(token).await?;
        self.mint_session_token(&user)
    }

    // ── Credential access ───────────────────────────────────────────────

    pub async fn get_access_token(&self, user_id: uuid::Uuid) -> AppResult<Option<String>> {
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(None);
        };
        self.secrets.get(&user.token_account_key()).await
    }

    /// Delete the keychain entry and set the DB sentinel. Idempotent.
    pub async fn logout(&self, user_id: uuid::Uuid) -> AppResult<()> {
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(());
        };
        self.secrets.delete(&user.token_account_key()).await?;
        tracing::info!(username = %user.username, "logged out");
        Ok(())
    }

    /// Soft-delete the account; the token column is overwritten with the
    /// redaction sentinel at the same moment.
    pub async fn delete_account(&self, user_id: uuid::Uuid) -> AppResult<()> {
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(());
        };
        if let Err(e) = self.secrets.delete(&user.token_account_key()).await {
            tracing::warn!(error = %e, "keychain cleanup during account deletion failed");
        }
        self.db
            .execute(
                sqlx::query(
                    "UPDATE users SET deleted_at = NOW(), github_token_encrypted = $2, \
                     updated_at = NOW() WHERE id = $1",
                )
                .bind(user.id)
                .bind(TOKEN_REDACTED),
            )
            .await?;
        tracing::info!(username = %user.username, "account soft-deleted");
        Ok(())
    }

    // ── User lookups / usage ────────────────────────────────────────────

    pub async fn find_user(&self, user_id: uuid::Uuid) -> AppResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?)
    }

    pub async fn require_user(&self, user_id: uuid::Uuid) -> AppResult<User> {
        self.find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user".into()))
    }

    pub async fn increment_commit_usage(&self, user_id: uuid::Uuid) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE users SET commits_this_month = commits_this_month + 1, \
                     updated_at = NOW() WHERE id = $1",
                )
                .bind(user_id),
            )
            .await?;
        Ok(())
    }

    pub async fn increment_pr_usage(&self, user_id: uuid::Uuid) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE users SET prs_this_month = prs_this_month + 1, \
                     updated_at = NOW() WHERE id = $1",
                )
                .bind(user_id),
            )
            .await?;
        Ok(())
    }

    pub async fn increment_repos_accessed(&self, user_id: uuid::Uuid) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE users SET repos_accessed_total = repos_accessed_total + 1, \
                     updated_at = NOW() WHERE id = $1",
                )
                .bind(user_id),
            )
            .await?;
        Ok(())
    }

    // ── Sweeper ─────────────────────────────────────────────────────────

    /// Clear expired OAuth states every minute. The returned handle is
    /// aborted during shutdown; the task never prevents process exit.
    pub fn spawn_state_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let states = self.states.clone();
        let ttl = Duration::from_secs(self.config.security.oauth_state_ttl_seconds);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                let mut map = states.write().await;
                let before = map.len();
                map.retain(|_, pending| pending.created_at.elapsed() <= ttl);
                let swept = before - map.len();
                if swept > 0 {
                    tracing::debug!(swept, "expired OAuth states removed");
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn state_count(&self) -> usize {
        self.states.read().await.len()
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").finish_non_exhaustive()
    }
}

async fn reset_usage_if_new_month(tx: &mut Tx, user: &User) -> AppResult<()> {
    use chrono::Datelike;
    let now = chrono::Utc::now();
    let last = user.usage_last_reset_at;
    if (last.year(), last.month()) == (now.year(), now.month()) {
        return Ok(());
    }
    sqlx::query(
        "UPDATE users SET commits_this_month = 0, prs_this_month = 0, \
         usage_last_reset_at = NOW(), updated_at = NOW() WHERE id = $1",
    )
    .bind(user.id)
    .execute(&mut **tx)
    .await?;
    tracing::info!(username = %user.username, "monthly usage counters reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AppConfig, DatabaseConfig, GitHubConfig, JwtConfig, RedisConfig, SecurityConfig,
        StripeConfig,
    };

    fn test_config(state_ttl: u64) -> Arc<Config> {
        Arc::new(Config {
            app: AppConfig {
                env: "test".into(),
                port: 3000,
                log_level: "debug".into(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/test".into(),
                pool_min: 1,
                pool_max: 2,
            },
            github: GitHubConfig {
                client_id: "client-id".into(),
                client_secret: "client-secret".into(),
                redirect_uri: "http://localhost:3000/oauth/callback".into(),
            },
            redis: RedisConfig {
                url: "redis://localhost".into(),
                ttl_seconds: 300,
            },
            jwt: JwtConfig {
                secret: "unit-test-jwt-secret".into(),
                expires_in: "7d".into(),
                issuer: "gitflow-backend".into(),
            },
            security: SecurityConfig {
                keychain_service: "gitflow-test".into(),
                oauth_state_ttl_seconds: state_ttl,
            },
            stripe: StripeConfig::default(),
        })
    }

    fn service(state_ttl: u64) -> AuthService {
        let db = Db::connect_lazy_test();
        let secrets = Arc::new(SecretStore::new(
            db.clone(),
            "gitflow-test",
            "unit-test-secret",
        ));
        AuthService::new(db, secrets, reqwest::Client::new(), test_config(state_ttl))
    }

    fn sample_user() -> User {
        let now = chrono::Utc::now();
        User {
            id: uuid::Uuid::new_v4(),
            github_id: 12345,
            username: "octocat".into(),
            email: "octocat@users.noreply.github.com".into(),
            display_name: None,
            avatar_url: None,
            tier: "free".into(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: None,
            subscription_renews_at: None,
            commits_this_month: 0,
            prs_this_month: 0,
            repos_accessed_total: 0,
            usage_last_reset_at: now,
            last_login_at: None,
            github_token_encrypted: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn initiate_builds_authorize_url_and_stores_state() {
        let auth = service(300);
        let init = auth.initiate_oauth(None).await;

        assert_eq!(init.state.len(), 64); // 32 random bytes, hex
        assert_eq!(init.expires_in, 300);
        let parsed = url::Url::parse(&init.url).unwrap();
        assert_eq!(parsed.host_str(), Some("github.com"));
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(pairs.get("state").map(String::as_str), Some(init.state.as_str()));
        assert_eq!(pairs.get("scope").map(String::as_str), Some("repo user read:org"));
        assert_eq!(pairs.get("allow_signup").map(String::as_str), Some("true"));
        assert_eq!(auth.state_count().await, 1);
    }

    #[tokio::test]
    async fn state_is_single_use() {
        let auth = service(300);
        let init = auth.initiate_oauth(None).await;

        assert!(auth.take_state(&init.state).await.is_ok());
        let replay = auth.take_state(&init.state).await.unwrap_err();
        assert!(matches!(replay, AppError::InvalidOauthState));
    }

    #[tokio::test]
    async fn unknown_state_is_invalid() {
        let auth = service(300);
        let err = auth.take_state("deadbeef").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOauthState));
    }

    #[tokio::test]
    async fn expired_state_is_rejected_and_consumed() {
        let auth = service(0);
        let init = auth.initiate_oauth(None).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = auth.take_state(&init.state).await.unwrap_err();
        assert!(matches!(err, AppError::ExpiredOauthState));
        // Consumed on expiry too.
        assert_eq!(auth.state_count().await, 0);
    }

    #[tokio::test]
    async fn jwt_roundtrip_carries_identity() {
        let auth = service(300);
        let user = sample_user();

        let token = auth.mint_session_token(&user).unwrap();
        let claims = auth.verify_session_token(&token).expect("valid token");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.github_id, 12345);
        assert_eq!(claims.username, "octocat");
        assert_eq!(claims.tier, "free");
        assert_eq!(claims.iss, "gitflow-backend");
    }

    #[tokio::test]
    async fn jwt_with_wrong_secret_fails() {
        let auth = service(300);
        let other = service(300);
        let user = sample_user();

        let token = auth.mint_session_token(&user).unwrap();
        // Same secret in both test services, so tamper with the token itself.
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(other.verify_session_token(&tampered).is_none());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let auth = service(300);
        assert!(auth.verify_session_token("not-a-jwt").is_none());
    }
}
