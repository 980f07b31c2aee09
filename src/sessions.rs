//! Work-session lifecycle: at most one active session per user, globally.
//!
//! State transitions run inside transactions that lock the affected rows
//! (`FOR UPDATE`), so concurrent mutations of the same session serialize on
//! the session row and the single-active invariant survives contention.

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use uuid::Uuid;

use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::{Repository, Session};

const ACTION_SUPERSEDED: &str = "session_superseded";
const ACTION_RESUMED: &str = "session_resumed";
const ACTION_STARTED: &str = "session_started";

#[derive(Debug)]
pub struct StartOutcome {
    pub session: Session,
    pub previous: Option<Session>,
    pub auto_closed: bool,
}

#[derive(Debug)]
pub struct StopOutcome {
    pub session: Session,
    pub duration_minutes: i64,
    pub duration_human: String,
}

pub struct SessionService {
    db: Db,
}

impl SessionService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub async fn find(&self, session_id: Uuid) -> AppResult<Option<Session>> {
        Ok(sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn active_for_user(&self, user_id: Uuid) -> AppResult<Option<Session>> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?)
    }

    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Session>> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE user_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(self.db.pool())
        .await?)
    }

    // ── Start ───────────────────────────────────────────────────────────

    /// Start a new active session. Any existing active session (possibly on
    /// a different repository) is abandoned inside the same transaction that
    /// inserts the replacement.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        repo: &Repository,
        task_description: Option<String>,
    ) -> AppResult<StartOutcome> {
        if !repo.is_cloned {
            return Err(AppError::NotCloned);
        }
        let branch = repo
            .current_branch
            .clone()
            .unwrap_or_else(|| "main".to_string());
        let repo_id = repo.id;

        self.db
            .transaction(move |tx| {
                async move {
                    let previous = sqlx::query_as::<_, Session>(
                        "SELECT * FROM sessions WHERE user_id = $1 AND status = 'active' FOR UPDATE",
                    )
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?;

                    let auto_closed = if let Some(prev) = &previous {
                        sqlx::query(
                            "UPDATE sessions SET status = 'abandoned', ended_at = NOW(), \
                             last_action = $2, last_action_at = NOW(), updated_at = NOW() \
                             WHERE id = $1",
                        )
                        .bind(prev.id)
                        .bind(ACTION_SUPERSEDED)
                        .execute(&mut **tx)
                        .await?;
                        true
                    } else {
                        false
                    };

                    let session = sqlx::query_as::<_, Session>(
                        "INSERT INTO sessions (id, user_id, repository_id, task_description, \
                         current_branch, last_action, last_action_at, status) \
                         VALUES ($1, $2, $3, $4, $5, $6, NOW(), 'active') RETURNING *",
                    )
                    .bind(Uuid::new_v4())
                    .bind(user_id)
                    .bind(repo_id)
                    .bind(&task_description)
                    .bind(&branch)
                    .bind(ACTION_STARTED)
                    .fetch_one(&mut **tx)
                    .await?;

                    Ok(StartOutcome {
                        session,
                        previous,
                        auto_closed,
                    })
                }
                .boxed()
            })
            .await
    }

    // ── Stop ────────────────────────────────────────────────────────────

    pub async fn stop_session(&self, user_id: Uuid, abandoned: bool) -> AppResult<StopOutcome> {
        let status = if abandoned { "abandoned" } else { "completed" };

        let session = self
            .db
            .transaction(move |tx| {
                async move {
                    let session = sqlx::query_as::<_, Session>(
                        "SELECT * FROM sessions WHERE user_id = $1 AND status = 'active' FOR UPDATE",
                    )
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("active session".into()))?;

                    let updated = sqlx::query_as::<_, Session>(
                        "UPDATE sessions SET status = $2, ended_at = NOW(), updated_at = NOW() \
                         WHERE id = $1 RETURNING *",
                    )
                    .bind(session.id)
                    .bind(status)
                    .fetch_one(&mut **tx)
                    .await?;
                    Ok(updated)
                }
                .boxed()
            })
            .await?;

        let ended = session.ended_at.unwrap_or_else(Utc::now);
        let minutes = (ended - session.started_at).num_minutes().max(0);
        Ok(StopOutcome {
            duration_minutes: minutes,
            duration_human: format_duration(minutes),
            session,
        })
    }

    // ── Resume ──────────────────────────────────────────────────────────

    /// Resume materializes a fresh active session inheriting the target's
    /// (repository, branch, task description); the target itself stays in
    /// whatever terminal state it reached. Branch checkout is handled by the
    /// caller (it owns the git driver); see `ResumeOutcome`.
    pub async fn resume_session(&self, session_id: Uuid, user_id: Uuid) -> AppResult<Session> {
        let target = self
            .find(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("session".into()))?;
        if target.user_id != user_id {
            return Err(AppError::Validation(
                "that session belongs to a different user".into(),
            ));
        }

        self.db
            .transaction(move |tx| {
                async move {
                    let active = sqlx::query_as::<_, Session>(
                        "SELECT * FROM sessions WHERE user_id = $1 AND status = 'active' FOR UPDATE",
                    )
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?;

                    if let Some(active) = &active {
                        if active.id == target.id {
                            // Already the active session: just refresh it.
                            let refreshed = sqlx::query_as::<_, Session>(
                                "UPDATE sessions SET last_action = $2, last_action_at = NOW(), \
                                 updated_at = NOW() WHERE id = $1 RETURNING *",
                            )
                            .bind(active.id)
                            .bind(ACTION_RESUMED)
                            .fetch_one(&mut **tx)
                            .await?;
                            return Ok(refreshed);
                        }
                        sqlx::query(
                            "UPDATE sessions SET status = 'abandoned', ended_at = NOW(), \
                             last_action = $2, last_action_at = NOW(), updated_at = NOW() \
                             WHERE id = $1",
                        )
                        .bind(active.id)
                        .bind(ACTION_SUPERSEDED)
                        .execute(&mut **tx)
                        .await?;
                    }

                    let session = sqlx::query_as::<_, Session>(
                        "INSERT INTO sessions (id, user_id, repository_id, task_description, \
                         current_branch, last_action, last_action_at, status) \
                         VALUES ($1, $2, $3, $4, $5, $6, NOW(), 'active') RETURNING *",
                    )
                    .bind(Uuid::new_v4())
                    .bind(user_id)
                    .bind(target.repository_id)
                    .bind(&target.task_description)
                    .bind(&target.current_branch)
                    .bind(ACTION_RESUMED)
                    .fetch_one(&mut **tx)
                    .await?;
                    Ok(session)
                }
                .boxed()
            })
            .await
    }

    // ── Mutations ───────────────────────────────────────────────────────

    pub async fn update_branch(&self, session_id: Uuid, branch: &str) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE sessions SET current_branch = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(session_id)
                .bind(branch),
            )
            .await?;
        Ok(())
    }

    pub async fn record_action(&self, session_id: Uuid, action: &str) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE sessions SET last_action = $2, last_action_at = NOW(), \
                     updated_at = NOW() WHERE id = $1",
                )
                .bind(session_id)
                .bind(action),
            )
            .await?;
        Ok(())
    }

    pub async fn increment_commits(&self, session_id: Uuid) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE sessions SET commits_count = commits_count + 1, \
                     last_action = 'commit', last_action_at = NOW(), updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(session_id),
            )
            .await?;
        Ok(())
    }

    pub async fn set_pr(
        &self,
        session_id: Uuid,
        pr_id: i64,
        pr_number: i32,
        pr_url: &str,
        pr_created_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE sessions SET pr_id = $2, pr_number = $3, pr_url = $4, \
                     pr_created_at = COALESCE($5, NOW()), last_action = 'pr_created', \
                     last_action_at = NOW(), updated_at = NOW() WHERE id = $1",
                )
                .bind(session_id)
                .bind(pr_id)
                .bind(pr_number)
                .bind(pr_url)
                .bind(pr_created_at),
            )
            .await?;
        Ok(())
    }

    pub async fn mark_completed(&self, session_id: Uuid) -> AppResult<()> {
        self.mark_terminal(session_id, "completed").await
    }

    pub async fn mark_abandoned(&self, session_id: Uuid) -> AppResult<()> {
        self.mark_terminal(session_id, "abandoned").await
    }

    async fn mark_terminal(&self, session_id: Uuid, status: &str) -> AppResult<()> {
        self.db
            .execute(
                sqlx::query(
                    "UPDATE sessions SET status = $2, ended_at = NOW(), updated_at = NOW() \
                     WHERE id = $1 AND status = 'active'",
                )
                .bind(session_id)
                .bind(status),
            )
            .await?;
        Ok(())
    }

    /// Abandon any active session whose last action is older than `days`.
    pub async fn cleanup_stale(&self, days: i64) -> AppResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let affected = self
            .db
            .execute(
                sqlx::query(
                    "UPDATE sessions SET status = 'abandoned', ended_at = NOW(), \
                     updated_at = NOW() \
                     WHERE status = 'active' AND COALESCE(last_action_at, started_at) < $1",
                )
                .bind(cutoff),
            )
            .await?;
        if affected > 0 {
            tracing::info!(affected, days, "stale sessions abandoned");
        }
        Ok(affected)
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService").finish_non_exhaustive()
    }
}

/// "less than a minute" / "N minute(s)" / "N hour(s)" / "N hour(s) M minute(s)".
pub fn format_duration(minutes: i64) -> String {
    if minutes < 1 {
        return "less than a minute".to_string();
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{m} minute(s)"),
        (h, 0) => format!("{h} hour(s)"),
        (h, m) => format!("{h} hour(s) {m} minute(s)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_boundaries() {
        assert_eq!(format_duration(0), "less than a minute");
        assert_eq!(format_duration(1), "1 minute(s)");
        assert_eq!(format_duration(59), "59 minute(s)");
        assert_eq!(format_duration(60), "1 hour(s)");
        assert_eq!(format_duration(61), "1 hour(s) 1 minute(s)");
        assert_eq!(format_duration(125), "2 hour(s) 5 minute(s)");
    }
}
