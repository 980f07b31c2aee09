//! Typed snapshot of environment configuration, loaded once at startup.
//!
//! Required variables produce one actionable error naming the variable;
//! everything else falls back to a documented default.

use crate::errors::{AppError, AppResult};

pub const GITHUB_SCOPES: &[&str] = &["repo", "user", "read:org"];

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub github: GitHubConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub stripe: StripeConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in: String,
    pub issuer: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub keychain_service: String,
    pub oauth_state_ttl_seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub pro_price_id: Option<String>,
}

fn required(name: &str) -> AppResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::Validation(format!("missing required environment variable: {name}"))
        })
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse<T: std::str::FromStr>(name: &str, raw: String) -> AppResult<T> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid value for {name}: {raw}")))
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let env = optional("APP_ENV", "development");
        let default_log = if env == "development" { "debug" } else { "info" };

        Ok(Self {
            app: AppConfig {
                log_level: optional("LOG_LEVEL", default_log),
                port: parse("PORT", optional("PORT", "3000"))?,
                env,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_min: parse("DATABASE_POOL_MIN", optional("DATABASE_POOL_MIN", "2"))?,
                pool_max: parse("DATABASE_POOL_MAX", optional("DATABASE_POOL_MAX", "10"))?,
            },
            github: GitHubConfig {
                client_id: required("GITHUB_CLIENT_ID")?,
                client_secret: required("GITHUB_CLIENT_SECRET")?,
                redirect_uri: optional(
                    "GITHUB_REDIRECT_URI",
                    "http://localhost:3000/oauth/callback",
                ),
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
                ttl_seconds: parse("REDIS_TTL_SECONDS", optional("REDIS_TTL_SECONDS", "300"))?,
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
                expires_in: optional("JWT_EXPIRES_IN", "7d"),
                issuer: optional("JWT_ISSUER", "gitflow-backend"),
            },
            security: SecurityConfig {
                keychain_service: optional("KEYCHAIN_SERVICE", "gitflow-backend"),
                oauth_state_ttl_seconds: parse(
                    "OAUTH_STATE_TTL_SECONDS",
                    optional("OAUTH_STATE_TTL_SECONDS", "300"),
                )?,
            },
            stripe: StripeConfig {
                secret_key: std::env::var("STRIPE_SECRET_KEY").ok().filter(|v| !v.is_empty()),
                webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                    .ok()
                    .filter(|v| !v.is_empty()),
                pro_price_id: std::env::var("STRIPE_PRO_PRICE_ID")
                    .ok()
                    .filter(|v| !v.is_empty()),
            },
        })
    }

    /// Port the OAuth callback listener binds to, parsed from the redirect URI.
    pub fn callback_port(&self) -> u16 {
        url::Url::parse(&self.github.redirect_uri)
            .ok()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(self.app.port)
    }

    /// Space-separated scope string for the authorization URL.
    pub fn github_scopes(&self) -> String {
        GITHUB_SCOPES.join(" ")
    }

    /// Base directory for managed clones: `~/.gitflow-for-pms/repos`.
    pub fn clone_base_dir() -> std::path::PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".gitflow-for-pms")
            .join("repos")
    }
}

/// Parse a duration string like `7d`, `12h`, `30m`, `45s` into seconds.
pub fn parse_expiry(spec: &str) -> AppResult<i64> {
    let spec = spec.trim();
    let (digits, unit) = spec.split_at(spec.len().saturating_sub(1));
    let (value, multiplier): (&str, i64) = match unit {
        "s" => (digits, 1),
        "m" => (digits, 60),
        "h" => (digits, 3600),
        "d" => (digits, 86_400),
        _ => (spec, 1),
    };
    value
        .parse::<i64>()
        .map(|n| n * multiplier)
        .map_err(|_| AppError::Validation(format!("invalid expiry spec: {spec}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_units() {
        assert_eq!(parse_expiry("7d").unwrap(), 7 * 86_400);
        assert_eq!(parse_expiry("12h").unwrap(), 12 * 3600);
        assert_eq!(parse_expiry("30m").unwrap(), 1800);
        assert_eq!(parse_expiry("45s").unwrap(), 45);
        assert_eq!(parse_expiry("90").unwrap(), 90);
    }

    #[test]
    fn expiry_rejects_garbage() {
        assert!(parse_expiry("sevend").is_err());
        assert!(parse_expiry("").is_err());
    }

    #[test]
    fn callback_port_parses_redirect_uri() {
        let cfg = Config {
            app: AppConfig {
                env: "test".into(),
                port: 3000,
                log_level: "debug".into(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/test".into(),
                pool_min: 2,
                pool_max: 10,
            },
            github: GitHubConfig {
                client_id: "cid".into(),
                client_secret: "sec".into(),
                redirect_uri: "http://localhost:8017/oauth/callback".into(),
            },
            redis: RedisConfig {
                url: "redis://localhost".into(),
                ttl_seconds: 300,
            },
            jwt: JwtConfig {
                secret: "s".into(),
                expires_in: "7d".into(),
                issuer: "gitflow-backend".into(),
            },
            security: SecurityConfig {
                keychain_service: "gitflow-backend".into(),
                oauth_state_ttl_seconds: 300,
            },
            stripe: StripeConfig::default(),
        };
        assert_eq!(cfg.callback_port(), 8017);
    }
}
