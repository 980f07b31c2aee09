//! Repository tools: `list_repositories`, `clone_and_setup_repo`.

use serde_json::{json, Value};

use super::{arg_str, arg_u32, require_user, ToolDefinition};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::git::{CloneOptions, GitDriver};
use crate::github::RepoListQuery;
use crate::models::{Tier, TierLimits};
use crate::state::AppState;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_repositories".to_string(),
            description: "List the GitHub repositories the user can access. Supports \
                paging, sorting, and filtering by organization."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "page": { "type": "integer", "minimum": 1, "description": "Page number (default 1)" },
                    "perPage": { "type": "integer", "minimum": 1, "maximum": 100, "description": "Results per page (default 30)" },
                    "sort": {
                        "type": "string",
                        "enum": ["created", "updated", "pushed", "full_name"],
                        "description": "Sort order (default updated)"
                    },
                    "org": { "type": "string", "description": "Limit to one organization" }
                },
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "clone_and_setup_repo".to_string(),
            description: "Clone a GitHub repository to this computer, record it, and start \
                a work session on it."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "repoFullName": { "type": "string", "minLength": 3, "description": "Repository as owner/name" },
                    "localPath": { "type": "string", "description": "Override the clone directory" },
                    "task": { "type": "string", "maxLength": 500, "description": "What the user plans to work on" }
                },
                "required": ["userId", "repoFullName"]
            }),
        },
    ]
}

pub async fn handle(state: &AppState, name: &str, args: &Value) -> AppResult<String> {
    match name {
        "list_repositories" => list_repositories(state, args).await,
        "clone_and_setup_repo" => clone_and_setup_repo(state, args).await,
        other => Err(AppError::Validation(format!("Unknown repo tool: {other}"))),
    }
}

async fn list_repositories(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let token = state
        .auth
        .get_access_token(user.id)
        .await?
        .ok_or(AppError::NotAuthenticated)?;

    let query = RepoListQuery {
        page: arg_u32(args, "page").unwrap_or(1),
        per_page: arg_u32(args, "perPage").unwrap_or(30),
        sort: arg_str(args, "sort").unwrap_or("updated").to_string(),
        org: arg_str(args, "org").map(String::from),
    };

    let remotes = state.github.list_repos(&token, &query).await?;
    for remote in &remotes {
        state.repos.upsert_remote(user.id, remote).await?;
    }

    if remotes.is_empty() {
        return Ok("## 📚 Your repositories\n\nNo repositories found on this page.".to_string());
    }

    // Free-tier display trimming is presentation only; the clone gate is
    // enforced separately in clone_and_setup_repo.
    let limits = TierLimits::for_tier(user.tier());
    let trim_to = if user.tier() == Tier::Free && remotes.len() as i64 > limits.max_repos {
        limits.max_repos as usize
    } else {
        remotes.len()
    };

    let mut out = format!("## 📚 Your repositories (page {})\n\n", query.page);
    for remote in remotes.iter().take(trim_to) {
        let visibility = if remote.private { "private" } else { "public" };
        out.push_str(&format!("- **{}** ({visibility})", remote.full_name));
        if let Some(description) = remote.description.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(&format!(" — {description}"));
        }
        out.push('\n');
    }

    let hidden = remotes.len() - trim_to;
    if hidden > 0 {
        out.push_str(&format!(
            "\n_Showing {trim_to} of {} — the free plan lists up to {}. Upgrade to see everything._\n",
            remotes.len(),
            limits.max_repos
        ));
    }
    out.push_str("\nUse `clone_and_setup_repo` with the owner/name to start working on one.");
    Ok(out)
}

async fn clone_and_setup_repo(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let full_name = arg_str(args, "repoFullName")
        .ok_or_else(|| AppError::Validation("Missing required argument: repoFullName".into()))?;
    let (owner, name) = full_name
        .split_once('/')
        .map(|(o, n)| (o.trim(), n.trim()))
        .filter(|(o, n)| !o.is_empty() && !n.is_empty())
        .ok_or_else(|| {
            AppError::Validation("repoFullName must look like owner/name, e.g. acme/widgets".into())
        })?;

    // Tier gate: number of cloned repositories.
    let limits = TierLimits::for_tier(user.tier());
    let cloned = state.repos.count_cloned(user.id).await?;
    if cloned >= limits.max_repos {
        return Err(AppError::TierLimit(format!(
            "{} of {} repositories on the {} plan",
            cloned,
            limits.max_repos,
            user.tier().as_str()
        )));
    }

    let token = state
        .auth
        .get_access_token(user.id)
        .await?
        .ok_or(AppError::NotAuthenticated)?;
    let remote = state.github.get_repo(&token, owner, name).await?;
    let repo = state.repos.upsert_remote(user.id, &remote).await?;

    let local_path = match arg_str(args, "localPath") {
        Some(path) => std::path::PathBuf::from(path),
        None => Config::clone_base_dir().join(owner).join(name),
    };

    let task = arg_str(args, "task").map(String::from);

    if repo.is_cloned && local_path.join(".git").exists() {
        let start = state
            .sessions
            .start_session(user.id, &repo, task)
            .await?;
        return Ok(format!(
            "## ✅ Already set up\n\n\
             `{}` is already cloned at `{}`. I've started a fresh session on it{}.",
            remote.full_name,
            local_path.display(),
            if start.auto_closed {
                " (your previous session was closed)"
            } else {
                ""
            }
        ));
    }

    let _guard = state.repo_locks.lock(&local_path).await;
    GitDriver::clone_repo(
        &state.secrets,
        &user.token_account_key(),
        &remote.clone_url,
        &local_path,
        CloneOptions::default(),
    )
    .await?;

    let driver = state.git_driver(&user, &local_path);
    let branch = driver.current_branch().await?;
    let repo = state.repos.mark_cloned(repo.id, &local_path, &branch).await?;
    state.auth.increment_repos_accessed(user.id).await?;

    let start = state.sessions.start_session(user.id, &repo, task).await?;

    let mut out = format!(
        "## ✅ Repository ready\n\n\
         `{}` is cloned at `{}` and a work session is active on branch **{branch}**.",
        remote.full_name,
        local_path.display()
    );
    if start.auto_closed {
        out.push_str("\n\n_Your previous session was closed automatically._");
    }
    out.push_str("\n\nMake your changes, then run `save_changes` when you want me to save them.");
    Ok(out)
}
