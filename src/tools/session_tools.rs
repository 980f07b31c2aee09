//! Session tools: `list_sessions`, `get_active_session`, `resume_session`.

use serde_json::{json, Value};

use super::{arg_uuid, require_user, ToolDefinition};
use crate::errors::{AppError, AppResult};
use crate::models::Session;
use crate::state::AppState;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_sessions".to_string(),
            description: "List the user's recent work sessions, newest first.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 100, "description": "How many to show (default 10)" }
                },
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "get_active_session".to_string(),
            description: "Show the user's current work session, if any.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" }
                },
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "resume_session".to_string(),
            description: "Pick up where a previous session left off: switches back to its \
                branch and starts a fresh session on the same task."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "sessionId": { "type": "string", "description": "Session to resume (UUID)" }
                },
                "required": ["userId", "sessionId"]
            }),
        },
    ]
}

pub async fn handle(state: &AppState, name: &str, args: &Value) -> AppResult<String> {
    match name {
        "list_sessions" => list_sessions(state, args).await,
        "get_active_session" => get_active_session(state, args).await,
        "resume_session" => resume_session(state, args).await,
        other => Err(AppError::Validation(format!("Unknown session tool: {other}"))),
    }
}

fn status_icon(session: &Session) -> &'static str {
    match session.status.as_str() {
        "active" => "🟢",
        "completed" => "✅",
        _ => "⚪",
    }
}

async fn describe(state: &AppState, session: &Session) -> String {
    let repo_label = match state.repos.find(session.repository_id).await {
        Ok(Some(repo)) => repo.full_name(),
        _ => "unknown repository".to_string(),
    };
    let task = session
        .task_description
        .as_deref()
        .unwrap_or("no task description");
    format!(
        "{} **{repo_label}** on `{}` — {task} ({} commit(s), {})",
        status_icon(session),
        session.current_branch,
        session.commits_count,
        session.status
    )
}

async fn list_sessions(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let limit = super::arg_u32(args, "limit").unwrap_or(10) as i64;
    let sessions = state.sessions.list_for_user(user.id, limit).await?;

    if sessions.is_empty() {
        return Ok("## 🗂 Your sessions\n\n\
            You haven't started any work sessions yet. \
            `clone_and_setup_repo` starts one."
            .to_string());
    }

    let mut out = "## 🗂 Your sessions\n\n".to_string();
    for session in &sessions {
        out.push_str(&format!(
            "- {} \n  id: `{}`\n",
            describe(state, session).await,
            session.id
        ));
    }
    out.push_str("\nUse `resume_session` with an id to pick one back up.");
    Ok(out)
}

async fn get_active_session(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    match state.sessions.active_for_user(user.id).await? {
        Some(session) => {
            let mut out = format!(
                "## 🟢 Active session\n\n{}\n\nStarted {}.\n",
                describe(state, &session).await,
                session.started_at.format("%Y-%m-%d %H:%M UTC")
            );
            if let Some(pr_url) = &session.pr_url {
                out.push_str(&format!("\nPull request: {pr_url}\n"));
            }
            Ok(out)
        }
        None => Ok("## 🗂 No active session\n\n\
            You're not working on anything right now. Use `clone_and_setup_repo` \
            to start, or `resume_session` to pick up where you left off."
            .to_string()),
    }
}

async fn resume_session(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let session_id = arg_uuid(args, "sessionId")?;

    // Authorizes, requires the repo to be cloned, abandons any other active
    // session, and creates the inheriting session.
    let target = state
        .sessions
        .find(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("session".into()))?;
    if target.user_id != user.id {
        return Err(AppError::Validation(
            "That session belongs to a different user.".into(),
        ));
    }
    let repo = state
        .repos
        .find(target.repository_id)
        .await?
        .ok_or_else(|| AppError::NotFound("repository".into()))?;
    if !repo.is_cloned {
        return Err(AppError::NotCloned);
    }
    let local_path = repo
        .local_path
        .clone()
        .ok_or(AppError::NotCloned)
        .map(std::path::PathBuf::from)?;

    let session = state.sessions.resume_session(session_id, user.id).await?;

    // Best-effort checkout of the session branch; the resume itself stands
    // even if the working tree can't switch right now.
    let branch_checked_out = {
        let _guard = state.repo_locks.lock(&local_path).await;
        let driver = state.git_driver(&user, &local_path);
        match driver.checkout(&session.current_branch).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    branch = %session.current_branch,
                    error = %e,
                    "resume: branch checkout failed"
                );
                false
            }
        }
    };
    if branch_checked_out {
        state
            .repos
            .update_branch(repo.id, &session.current_branch)
            .await?;
    }

    let mut out = format!(
        "## ▶️ Session resumed\n\nBack to work on **{}**, branch **{}**.",
        repo.full_name(),
        session.current_branch
    );
    if let Some(task) = &session.task_description {
        out.push_str(&format!("\n\nTask: {task}"));
    }
    if !branch_checked_out {
        out.push_str(
            "\n\n⚠️ I couldn't switch the working tree to that branch (you may have \
             unsaved changes). Save or discard them, then run `git_checkout`.",
        );
    }
    Ok(out)
}
