//! Two-tier secret store for GitHub access tokens.
//!
//! Tier A is the OS keychain (macOS Keychain, Windows Credential Manager,
//! Linux keyutils via the `keyring` crate). Tier B is the encrypted
//! `users.github_token_encrypted` column, AES-256-GCM with a key derived
//! from the JWT secret. Keychain failures are non-fatal: `put` succeeds if
//! either tier accepted the secret, and `get` returns `None` when both
//! tiers miss. Plaintext tokens never reach logs.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::{TOKEN_IN_KEYCHAIN, TOKEN_LOGGED_OUT};

/// Prefix marking ciphertext in the DB column.
const ENCRYPTED_PREFIX: &str = "enc:";

pub struct SecretStore {
    db: Db,
    service: String,
    key: [u8; 32],
}

impl SecretStore {
    pub fn new(db: Db, keychain_service: &str, encryption_secret: &str) -> Self {
        // Any-length secret, fixed-length key.
        let hash = Sha256::digest(encryption_secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&hash);
        Self {
            db,
            service: keychain_service.to_string(),
            key,
        }
    }

    /// Store a secret. Keychain first; on keychain failure fall back to the
    /// encrypted DB column. Errors only when both tiers reject.
    pub async fn put(&self, account_key: &str, secret: &str) -> AppResult<()> {
        match self.keychain_set(account_key, secret).await {
            Ok(()) => {
                self.set_token_column(account_key, TOKEN_IN_KEYCHAIN).await?;
                tracing::debug!(account = %account_key, "secret stored in keychain");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(account = %account_key, error = %e, "keychain unavailable, using encrypted column");
                let ciphertext = self.encrypt(secret)?;
                self.set_token_column(account_key, &ciphertext).await?;
                Ok(())
            }
        }
    }

    /// Fetch a secret. Keychain first, encrypted column second; `None` when
    /// both miss or fail. Keychain error types never escape this method.
    pub async fn get(&self, account_key: &str) -> AppResult<Option<String>> {
        match self.keychain_get(account_key).await {
            Ok(Some(secret)) => return Ok(Some(secret)),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(account = %account_key, error = %e, "keychain read failed, trying fallback");
            }
        }

        let Some(stored) = self.get_token_column(account_key).await? else {
            return Ok(None);
        };
        match stored.as_str() {
            TOKEN_IN_KEYCHAIN | TOKEN_LOGGED_OUT | crate::models::TOKEN_REDACTED => Ok(None),
            _ => Ok(self.decrypt(&stored)),
        }
    }

    /// Remove the secret from both tiers and mark the column logged out.
    /// Idempotent.
    pub async fn delete(&self, account_key: &str) -> AppResult<()> {
        if let Err(e) = self.keychain_delete(account_key).await {
            tracing::debug!(account = %account_key, error = %e, "keychain delete failed");
        }
        self.set_token_column(account_key, TOKEN_LOGGED_OUT).await?;
        Ok(())
    }

    // ── Tier A: OS keychain ─────────────────────────────────────────────
    // keyring is synchronous; run on the blocking pool.

    async fn keychain_set(&self, account: &str, secret: &str) -> Result<(), String> {
        let service = self.service.clone();
        let account = account.to_string();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || {
            keyring::Entry::new(&service, &account)
                .and_then(|entry| entry.set_password(&secret))
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn keychain_get(&self, account: &str) -> Result<Option<String>, String> {
        let service = self.service.clone();
        let account = account.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &account).map_err(|e| e.to_string())?;
            match entry.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn keychain_delete(&self, account: &str) -> Result<(), String> {
        let service = self.service.clone();
        let account = account.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &account).map_err(|e| e.to_string())?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
        .map_err(|e| e.to_string())?
    }

    // ── Tier B: encrypted DB column ─────────────────────────────────────

    async fn set_token_column(&self, account_key: &str, value: &str) -> AppResult<()> {
        let github_id = parse_account_key(account_key)?;
        self.db
            .execute(
                sqlx::query(
                    "UPDATE users SET github_token_encrypted = $1, updated_at = NOW() \
                     WHERE github_id = $2 AND deleted_at IS NULL",
                )
                .bind(value)
                .bind(github_id),
            )
            .await?;
        Ok(())
    }

    async fn get_token_column(&self, account_key: &str) -> AppResult<Option<String>> {
        let github_id = parse_account_key(account_key)?;
        let row: Option<Option<String>> = sqlx::query_scalar(
            "SELECT github_token_encrypted FROM users \
             WHERE github_id = $1 AND deleted_at IS NULL",
        )
        .bind(github_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.flatten())
    }

    // ── AES-256-GCM ─────────────────────────────────────────────────────

    fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .expect("AES-256-GCM key is exactly 32 bytes");
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal("token encryption failed".into()))?;

        // nonce (12 bytes) || ciphertext, base64
        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(&combined)))
    }

    fn decrypt(&self, stored: &str) -> Option<String> {
        let encoded = stored.strip_prefix(ENCRYPTED_PREFIX)?;
        let combined = STANDARD.decode(encoded).ok()?;
        if combined.len() < 12 {
            tracing::error!("token decryption: stored value too short");
            return None;
        }

        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .expect("AES-256-GCM key is exactly 32 bytes");
        match cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext) {
            Ok(plaintext) => String::from_utf8(plaintext).ok(),
            Err(_) => {
                tracing::error!("token decryption failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material intentionally omitted.
        f.debug_struct("SecretStore")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

fn parse_account_key(account_key: &str) -> AppResult<i64> {
    account_key
        .strip_prefix("github_")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| AppError::Validation(format!("malformed account key: {account_key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SecretStore {
        SecretStore::new(Db::connect_lazy_test(), "gitflow-test", "unit-test-secret")
    }

    #[tokio::test]
    async fn encrypt_roundtrip() {
        let s = store();
        let ciphertext = s.encrypt("gho_abc123").unwrap();
        assert!(ciphertext.starts_with("enc:"));
        assert_eq!(s.decrypt(&ciphertext).unwrap(), "gho_abc123");
    }

    #[tokio::test]
    async fn ciphertext_never_contains_plaintext() {
        let s = store();
        let ciphertext = s.encrypt("gho_supersecret").unwrap();
        assert!(!ciphertext.contains("supersecret"));
    }

    #[tokio::test]
    async fn decrypt_rejects_sentinels_and_garbage() {
        let s = store();
        assert!(s.decrypt(TOKEN_IN_KEYCHAIN).is_none());
        assert!(s.decrypt(TOKEN_LOGGED_OUT).is_none());
        assert!(s.decrypt("enc:not-base64!!!").is_none());
        assert!(s.decrypt("enc:AAAA").is_none());
    }

    #[tokio::test]
    async fn decrypt_with_wrong_key_fails() {
        let s1 = store();
        let s2 = SecretStore::new(Db::connect_lazy_test(), "gitflow-test", "other-secret");
        let ciphertext = s1.encrypt("gho_abc123").unwrap();
        assert!(s2.decrypt(&ciphertext).is_none());
    }

    #[test]
    fn account_key_parsing() {
        assert_eq!(parse_account_key("github_12345").unwrap(), 12345);
        assert!(parse_account_key("gitlab_1").is_err());
        assert!(parse_account_key("github_abc").is_err());
    }
}
