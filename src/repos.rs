//! Repository-row access: records of remote GitHub repositories that have
//! been (or will be) cloned locally for a particular user.

use std::path::Path;

use uuid::Uuid;

use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::{GitHubRepo, Repository};

pub struct RepoStore {
    db: Db,
}

impl RepoStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn find(&self, repo_id: Uuid) -> AppResult<Option<Repository>> {
        Ok(sqlx::query_as::<_, Repository>(
            "SELECT * FROM repositories WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(repo_id)
        .fetch_optional(self.db.pool())
        .await?)
    }

    pub async fn find_owned(&self, repo_id: Uuid, user_id: Uuid) -> AppResult<Option<Repository>> {
        Ok(sqlx::query_as::<_, Repository>(
            "SELECT * FROM repositories WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(repo_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?)
    }

    pub async fn find_by_local_path(
        &self,
        user_id: Uuid,
        local_path: &str,
    ) -> AppResult<Option<Repository>> {
        Ok(sqlx::query_as::<_, Repository>(
            "SELECT * FROM repositories \
             WHERE user_id = $1 AND local_path = $2 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(local_path)
        .fetch_optional(self.db.pool())
        .await?)
    }

    pub async fn find_by_github_id(
        &self,
        user_id: Uuid,
        github_repo_id: i64,
    ) -> AppResult<Option<Repository>> {
        Ok(sqlx::query_as::<_, Repository>(
            "SELECT * FROM repositories \
             WHERE user_id = $1 AND github_repo_id = $2 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(github_repo_id)
        .fetch_optional(self.db.pool())
        .await?)
    }

    pub async fn count_cloned(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM repositories \
             WHERE user_id = $1 AND is_cloned AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?)
    }

    /// Record a remote repository for this user (created on first listing or
    /// first clone attempt); refreshes description and URL if already known.
    pub async fn upsert_remote(
        &self,
        user_id: Uuid,
        remote: &GitHubRepo,
    ) -> AppResult<Repository> {
        Ok(sqlx::query_as::<_, Repository>(
            "INSERT INTO repositories (id, user_id, github_repo_id, owner, name, url, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, github_repo_id) WHERE deleted_at IS NULL \
             DO UPDATE SET owner = $4, name = $5, url = $6, description = $7, updated_at = NOW() \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(remote.id)
        .bind(&remote.owner.login)
        .bind(&remote.name)
        .bind(&remote.html_url)
        .bind(&remote.description)
        .fetch_one(self.db.pool())
        .await?)
    }

    pub async fn mark_cloned(
        &self,
        repo_id: Uuid,
        local_path: &Path,
        current_branch: &str,
    ) -> AppResult<Repository> {
        Ok(sqlx::query_as::<_, Repository>(
            "UPDATE repositories SET is_cloned = TRUE, cloned_at = NOW(), local_path = $2, \
             current_branch = $3, last_accessed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(repo_id)
        .bind(local_path.to_string_lossy().as_ref())
        .bind(current_branch)
        .fetch_one(self.db.pool())
        .await
        .map_err(AppError::Db)?)
    }

    pub async fn update_branch(&self, repo_id: Uuid, branch: &str) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE repositories SET current_branch = $2, last_accessed_at = NOW(), \
                     updated_at = NOW() WHERE id = $1",
                )
                .bind(repo_id)
                .bind(branch),
            )
            .await?;
        Ok(())
    }

    pub async fn touch(&self, repo_id: Uuid) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE repositories SET last_accessed_at = NOW(), updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(repo_id),
            )
            .await?;
        Ok(())
    }

    /// Every cloned repository row, across users. Used by the startup scrub
    /// that repairs credentialed remote URLs left by a crashed process.
    pub async fn all_cloned(&self) -> AppResult<Vec<Repository>> {
        Ok(sqlx::query_as::<_, Repository>(
            "SELECT * FROM repositories WHERE is_cloned AND deleted_at IS NULL",
        )
        .fetch_all(self.db.pool())
        .await?)
    }
}

impl std::fmt::Debug for RepoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoStore").finish_non_exhaustive()
    }
}
