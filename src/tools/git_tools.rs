//! Low-level Git tools: `git_status`, `git_commit`, `git_push`, `git_pull`,
//! `git_clone`, `git_checkout`.
//!
//! These expose the driver almost directly; the "smart" behavior lives in
//! the workflow tools. All mutating operations hold the per-path lock.

use serde_json::{json, Value};

use super::{arg_bool, arg_str, require_user, resolve_repo_context, ToolDefinition};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::git::{CloneOptions, CommitOptions, GitDriver, PullOutcome, PushOptions, PushOutcome};
use crate::state::AppState;

fn repo_scope_properties() -> Value {
    json!({
        "userId": { "type": "string", "description": "User id (UUID)" },
        "repoId": { "type": "string", "description": "Managed repository id (UUID)" },
        "localPath": { "type": "string", "description": "Absolute path to a working tree" }
    })
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "git_status".to_string(),
            description: "Show the working tree status: current branch, changed files, and \
                how far the branch is ahead/behind its remote."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": repo_scope_properties(),
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "git_commit".to_string(),
            description: "Stage and commit changes with a message. Commits everything by \
                default; pass `files` to commit a subset."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "repoId": { "type": "string", "description": "Managed repository id (UUID)" },
                    "localPath": { "type": "string", "description": "Absolute path to a working tree" },
                    "message": { "type": "string", "minLength": 1, "maxLength": 500, "description": "Commit message" },
                    "files": { "type": "string", "description": "Comma-separated paths to commit; omit for all changes" }
                },
                "required": ["userId", "message"]
            }),
        },
        ToolDefinition {
            name: "git_push".to_string(),
            description: "Push the current (or named) branch to GitHub.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "repoId": { "type": "string", "description": "Managed repository id (UUID)" },
                    "localPath": { "type": "string", "description": "Absolute path to a working tree" },
                    "branch": { "type": "string", "description": "Branch to push; defaults to the current branch" },
                    "setUpstream": { "type": "boolean", "description": "Create the upstream tracking ref" },
                    "forceWithLease": { "type": "boolean", "description": "Force-push, but only if the remote hasn't moved" }
                },
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "git_pull".to_string(),
            description: "Pull the latest changes from GitHub into the working tree."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "repoId": { "type": "string", "description": "Managed repository id (UUID)" },
                    "localPath": { "type": "string", "description": "Absolute path to a working tree" },
                    "rebase": { "type": "boolean", "description": "Rebase local commits on top of the remote" }
                },
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "git_clone".to_string(),
            description: "Clone a repository by URL. For GitHub repositories prefer \
                `clone_and_setup_repo`, which also records it and starts a session."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "url": { "type": "string", "description": "HTTPS clone URL" },
                    "localPath": { "type": "string", "description": "Target directory; defaults to the managed clones directory" },
                    "depth": { "type": "integer", "minimum": 1, "description": "Shallow-clone depth" },
                    "branch": { "type": "string", "description": "Branch to check out" }
                },
                "required": ["userId", "url"]
            }),
        },
        ToolDefinition {
            name: "git_checkout".to_string(),
            description: "Switch to a branch, optionally creating it first.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "repoId": { "type": "string", "description": "Managed repository id (UUID)" },
                    "localPath": { "type": "string", "description": "Absolute path to a working tree" },
                    "branch": { "type": "string", "minLength": 1, "description": "Branch name" },
                    "create": { "type": "boolean", "description": "Create the branch if it doesn't exist" }
                },
                "required": ["userId", "branch"]
            }),
        },
    ]
}

pub async fn handle(state: &AppState, name: &str, args: &Value) -> AppResult<String> {
    match name {
        "git_status" => git_status(state, args).await,
        "git_commit" => git_commit(state, args).await,
        "git_push" => git_push(state, args).await,
        "git_pull" => git_pull(state, args).await,
        "git_clone" => git_clone(state, args).await,
        "git_checkout" => git_checkout(state, args).await,
        other => Err(AppError::Validation(format!("Unknown git tool: {other}"))),
    }
}

async fn git_status(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let context = resolve_repo_context(state, &user, args).await?;
    let driver = state.git_driver(&user, &context.local_path);
    let status = driver.status().await?;

    let mut out = format!(
        "## 📋 Status of `{}`\n\nOn branch **{}**",
        context.local_path.display(),
        status.current_branch
    );
    if status.ahead > 0 || status.behind > 0 {
        out.push_str(&format!(
            " ({} ahead, {} behind the remote)",
            status.ahead, status.behind
        ));
    }
    out.push_str("\n\n");

    if status.is_clean {
        out.push_str("The working tree is clean — nothing to save.\n");
        return Ok(out);
    }
    if !status.staged.is_empty() {
        out.push_str(&format!("**Staged ({}):**\n", status.staged.len()));
        for file in &status.staged {
            out.push_str(&format!("- `{file}`\n"));
        }
    }
    if !status.modified.is_empty() {
        out.push_str(&format!("**Modified ({}):**\n", status.modified.len()));
        for file in &status.modified {
            out.push_str(&format!("- `{file}`\n"));
        }
    }
    if !status.untracked.is_empty() {
        out.push_str(&format!("**New files ({}):**\n", status.untracked.len()));
        for file in &status.untracked {
            out.push_str(&format!("- `{file}`\n"));
        }
    }
    Ok(out)
}

async fn git_commit(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let context = resolve_repo_context(state, &user, args).await?;
    let message = arg_str(args, "message")
        .ok_or_else(|| AppError::Validation("Missing required argument: message".into()))?;
    let files = arg_str(args, "files").map(|list| {
        list.split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
    });

    let _guard = state.repo_locks.lock(&context.local_path).await;
    let driver = state.git_driver(&user, &context.local_path);

    if files.is_none() {
        driver.add_all().await?;
    }
    let result = driver
        .commit(
            message,
            CommitOptions {
                files,
                ..Default::default()
            },
        )
        .await?;

    if let Some(session) = &context.session {
        state.sessions.increment_commits(session.id).await?;
    }
    state.auth.increment_commit_usage(user.id).await?;

    Ok(format!(
        "## ✅ Committed\n\n\
         Commit `{}`: {} file(s) changed, +{} / −{} lines.",
        result.short_hash, result.files_changed, result.insertions, result.deletions
    ))
}

async fn git_push(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let context = resolve_repo_context(state, &user, args).await?;

    let _guard = state.repo_locks.lock(&context.local_path).await;
    let driver = state.git_driver(&user, &context.local_path);
    let branch = match arg_str(args, "branch") {
        Some(b) => b.to_string(),
        None => driver.current_branch().await?,
    };

    let outcome = driver
        .push(
            &branch,
            PushOptions {
                set_upstream: arg_bool(args, "setUpstream"),
                force_with_lease: arg_bool(args, "forceWithLease"),
                ..Default::default()
            },
        )
        .await?;

    match outcome {
        PushOutcome::Success { branch } => Ok(format!(
            "## ✅ Pushed\n\nBranch **{branch}** is now on GitHub."
        )),
        PushOutcome::PolicyRejection { report, .. } => {
            // Low-level push: report the rejection without rewriting history.
            // The remediation loop belongs to `push_for_review`.
            let mut out = format!("## 🚨 Critical Error\n\n{}\n", report.message);
            if !report.violations.is_empty() {
                out.push_str("\n**Where:**\n");
                for violation in report.violations.iter().take(5) {
                    match violation.line {
                        Some(line) => out.push_str(&format!(
                            "- `{}` line {line} ({})\n",
                            violation.file, violation.secret_type
                        )),
                        None => out.push_str(&format!(
                            "- `{}` ({})\n",
                            violation.file, violation.secret_type
                        )),
                    }
                }
            }
            out.push_str(
                "\n**What you can do:**\n\
                 - Use `push_for_review` — it removes the blocked commit from history and walks you through the fix\n",
            );
            Ok(out)
        }
    }
}

async fn git_pull(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let context = resolve_repo_context(state, &user, args).await?;

    let _guard = state.repo_locks.lock(&context.local_path).await;
    let driver = state.git_driver(&user, &context.local_path);

    match driver.pull(arg_bool(args, "rebase")).await? {
        PullOutcome::Success { new_commits } => Ok(if new_commits == 0 {
            "## ✅ Up to date\n\nYou already have the latest changes.".to_string()
        } else {
            format!(
                "## ✅ Pulled\n\nDownloaded {new_commits} new commit(s) from GitHub."
            )
        }),
        PullOutcome::Conflict { files } => {
            let mut out = "## ⚠️ Merge conflict\n\n\
                Your changes overlap with changes on GitHub. These files need a decision:\n\n"
                .to_string();
            for file in files.iter().take(5) {
                out.push_str(&format!("- `{file}`\n"));
            }
            let extra = files.len().saturating_sub(5);
            if extra > 0 {
                out.push_str(&format!("- … and {extra} more\n"));
            }
            out.push_str(
                "\n**What you can do:**\n\
                 - Open each file and choose which version to keep\n\
                 - Then run `save_changes` to finish\n",
            );
            Ok(out)
        }
    }
}

async fn git_clone(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let url = arg_str(args, "url")
        .ok_or_else(|| AppError::Validation("Missing required argument: url".into()))?;

    let (owner, name) = parse_owner_name(url)?;
    let local_path = match arg_str(args, "localPath") {
        Some(path) => std::path::PathBuf::from(path),
        None => Config::clone_base_dir().join(&owner).join(&name),
    };
    if local_path.join(".git").exists() {
        return Ok(format!(
            "## ℹ️ Already cloned\n\n`{}` already exists at `{}`.",
            name,
            local_path.display()
        ));
    }

    let _guard = state.repo_locks.lock(&local_path).await;
    GitDriver::clone_repo(
        &state.secrets,
        &user.token_account_key(),
        url,
        &local_path,
        CloneOptions {
            depth: super::arg_u32(args, "depth"),
            branch: arg_str(args, "branch").map(String::from),
            single_branch: false,
        },
    )
    .await?;

    let driver = state.git_driver(&user, &local_path);
    let branch = driver.current_branch().await?;

    // Record the clone when the remote is a GitHub repository we can see.
    if let Some(token) = state.secrets.get(&user.token_account_key()).await? {
        match state.github.get_repo(&token, &owner, &name).await {
            Ok(remote) => {
                let repo = state.repos.upsert_remote(user.id, &remote).await?;
                state.repos.mark_cloned(repo.id, &local_path, &branch).await?;
                state.auth.increment_repos_accessed(user.id).await?;
            }
            Err(e) => {
                tracing::debug!(error = %e, "clone not recorded as managed repository");
            }
        }
    }

    Ok(format!(
        "## ✅ Cloned\n\n`{owner}/{name}` is ready at `{}` on branch **{branch}**.",
        local_path.display()
    ))
}

async fn git_checkout(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let context = resolve_repo_context(state, &user, args).await?;
    let branch = arg_str(args, "branch")
        .ok_or_else(|| AppError::Validation("Missing required argument: branch".into()))?;

    let _guard = state.repo_locks.lock(&context.local_path).await;
    let driver = state.git_driver(&user, &context.local_path);

    if arg_bool(args, "create") {
        driver.create_branch(branch, None, true).await?;
    } else {
        driver.checkout(branch).await?;
    }

    if let Some(repo) = &context.repo {
        state.repos.update_branch(repo.id, branch).await?;
    }
    if let Some(session) = &context.session {
        state.sessions.update_branch(session.id, branch).await?;
        state.sessions.record_action(session.id, "checkout").await?;
    }

    Ok(format!("## ✅ Switched\n\nYou're now on branch **{branch}**."))
}

/// `https://github.com/owner/name(.git)` → (owner, name).
fn parse_owner_name(url: &str) -> AppResult<(String, String)> {
    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::Validation(format!("That doesn't look like a clone URL: {url}")))?;
    let mut segments = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter();
    let owner = segments
        .next()
        .ok_or_else(|| AppError::Validation("Clone URL is missing the repository owner".into()))?;
    let name = segments
        .next()
        .ok_or_else(|| AppError::Validation("Clone URL is missing the repository name".into()))?;
    Ok((owner.to_string(), name.trim_end_matches(".git").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_name_from_clone_url() {
        let (owner, name) = parse_owner_name("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(name, "widgets");

        let (owner, name) = parse_owner_name("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(name, "widgets");
    }

    #[test]
    fn bad_urls_are_rejected() {
        assert!(parse_owner_name("not a url").is_err());
        assert!(parse_owner_name("https://github.com/").is_err());
    }
}
