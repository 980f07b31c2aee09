//! Smart workflow tools: `get_repo_status`, `save_changes`,
//! `push_for_review`.
//!
//! `save_changes` implements the smart-commit rule: a commit requested on a
//! protected branch first branches off to a feature branch derived from the
//! commit message. `push_for_review` owns the push-protection recovery loop.
//! Both append a fenced JSON view the agent can parse.

use serde_json::{json, Value};

use super::{
    arg_bool, arg_str, require_user, resolve_repo_context, with_json_block, ToolDefinition,
};
use crate::errors::{AppError, AppResult};
use crate::git::{slug, CommitOptions, PushOptions, PushOutcome};
use crate::policy;
use crate::state::AppState;

const PR_FOOTER: &str = "---\n_Opened with GitFlow for PMs._";

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_repo_status".to_string(),
            description: "Friendly overview of where the user's work stands: branch, \
                unsaved changes, and the active session."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "repoId": { "type": "string", "description": "Managed repository id (UUID)" },
                    "localPath": { "type": "string", "description": "Absolute path to a working tree" }
                },
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "save_changes".to_string(),
            description: "Save the user's work: stages everything and commits with the \
                given message. On a protected branch (main/master/develop) it creates a \
                feature branch first."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "repoId": { "type": "string", "description": "Managed repository id (UUID)" },
                    "localPath": { "type": "string", "description": "Absolute path to a working tree" },
                    "message": {
                        "type": "string",
                        "minLength": 1,
                        "maxLength": 500,
                        "description": "What this save is about, in plain words"
                    }
                },
                "required": ["userId", "message"]
            }),
        },
        ToolDefinition {
            name: "push_for_review".to_string(),
            description: "Send the current branch to GitHub and open a pull request so \
                teammates can review the work."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" },
                    "title": { "type": "string", "maxLength": 256, "description": "Pull request title" },
                    "description": { "type": "string", "maxLength": 65536, "description": "Pull request description" },
                    "isDraft": { "type": "boolean", "description": "Open as a draft PR" }
                },
                "required": ["userId"]
            }),
        },
    ]
}

pub async fn handle(state: &AppState, name: &str, args: &Value) -> AppResult<String> {
    match name {
        "get_repo_status" => get_repo_status(state, args).await,
        "save_changes" => save_changes(state, args).await,
        "push_for_review" => push_for_review(state, args).await,
        other => Err(AppError::Validation(format!("Unknown workflow tool: {other}"))),
    }
}

// ── get_repo_status ─────────────────────────────────────────────────────

async fn get_repo_status(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let context = resolve_repo_context(state, &user, args).await?;
    let driver = state.git_driver(&user, &context.local_path);
    let status = driver.status().await?;

    let repo_label = context
        .repo
        .as_ref()
        .map(|r| r.full_name())
        .unwrap_or_else(|| context.local_path.display().to_string());

    let mut out = format!("## 📋 Where things stand in `{repo_label}`\n\n");
    out.push_str(&format!("You're on branch **{}**", status.current_branch));
    if slug::is_protected_branch(&status.current_branch) {
        out.push_str(" (a protected branch — saving will create a feature branch)");
    }
    out.push_str(".\n\n");

    let dirty = status.dirty_files();
    if dirty.is_empty() {
        out.push_str("All your work is saved — no pending changes.\n");
    } else {
        out.push_str(&format!("You have {} file(s) with unsaved changes:\n", dirty.len()));
        for file in dirty.iter().take(5) {
            out.push_str(&format!("- `{file}`\n"));
        }
        let extra = dirty.len().saturating_sub(5);
        if extra > 0 {
            out.push_str(&format!("- … and {extra} more\n"));
        }
        out.push_str("\nRun `save_changes` with a short message to save them.\n");
    }

    if status.behind > 0 {
        out.push_str(&format!(
            "\nHeads up: the remote has {} commit(s) you don't have yet — `git_pull` will fetch them.\n",
            status.behind
        ));
    }

    match &context.session {
        Some(session) => {
            out.push_str(&format!(
                "\n**Session:** {} ({} commit(s) so far)",
                session.task_description.as_deref().unwrap_or("no task description"),
                session.commits_count
            ));
            if let Some(pr_url) = &session.pr_url {
                out.push_str(&format!("\n**Pull request:** {pr_url}"));
            }
            out.push('\n');
        }
        None => out.push_str("\nNo active session on this repository.\n"),
    }

    Ok(out)
}

// ── save_changes ────────────────────────────────────────────────────────

async fn save_changes(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    let message = arg_str(args, "message")
        .ok_or_else(|| AppError::Validation("Missing required argument: message".into()))?;

    let context = resolve_repo_context(state, &user, args).await?;
    let repo = context.managed()?.clone();

    let _guard = state.repo_locks.lock(&context.local_path).await;
    let driver = state.git_driver(&user, &context.local_path);

    let status = driver.status().await?;
    if status.is_clean {
        return Ok(with_json_block(
            "## ℹ️ Nothing to save\n\nNo files have changed since your last save.",
            &json!({ "saved": false, "reason": "working_tree_clean" }),
        ));
    }

    // Smart-commit rule: never commit directly on a protected branch.
    let mut branch = status.current_branch.clone();
    let mut branch_created = false;
    if slug::is_protected_branch(&branch) {
        let feature = slug::branch_name_for_message(message);
        driver.create_branch(&feature, None, true).await?;
        branch = feature;
        branch_created = true;
    }

    driver.add_all().await?;
    let commit = driver.commit(message, CommitOptions::default()).await?;

    if let Some(session) = &context.session {
        state.sessions.update_branch(session.id, &branch).await?;
        state.sessions.increment_commits(session.id).await?;
    }
    state.repos.update_branch(repo.id, &branch).await?;
    state.auth.increment_commit_usage(user.id).await?;

    let mut out = String::from("## ✅ Changes saved\n\n");
    if branch_created {
        out.push_str(&format!(
            "You were on a protected branch, so I created **{branch}** and saved your work there.\n\n"
        ));
    } else {
        out.push_str(&format!("Saved on branch **{branch}**.\n\n"));
    }
    out.push_str(&format!(
        "- Commit: `{}`\n- {} file(s) changed, +{} / −{} lines\n\n\
         When you're ready for feedback, run `push_for_review`.",
        commit.short_hash, commit.files_changed, commit.insertions, commit.deletions
    ));

    Ok(with_json_block(
        &out,
        &json!({
            "saved": true,
            "branch_created": branch_created,
            "branch": branch,
            "commit": commit.short_hash,
            "files_changed": commit.files_changed,
            "insertions": commit.insertions,
            "deletions": commit.deletions,
        }),
    ))
}

// ── push_for_review ─────────────────────────────────────────────────────

async fn push_for_review(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;

    let token = state
        .auth
        .get_access_token(user.id)
        .await?
        .ok_or(AppError::NotAuthenticated)?;

    let session = state
        .sessions
        .active_for_user(user.id)
        .await?
        .ok_or_else(|| {
            AppError::Validation(
                "There's no active work session. Save some changes first with `save_changes`."
                    .into(),
            )
        })?;
    let repo = state
        .repos
        .find(session.repository_id)
        .await?
        .ok_or_else(|| AppError::NotFound("repository".into()))?;
    let local_path = repo
        .local_path
        .clone()
        .ok_or(AppError::NotCloned)
        .map(std::path::PathBuf::from)?;

    let _guard = state.repo_locks.lock(&local_path).await;
    let driver = state.git_driver(&user, &local_path);
    let status = driver.status().await?;
    let branch = status.current_branch.clone();

    if slug::is_protected_branch(&branch) {
        return Err(AppError::Validation(format!(
            "You're on the protected branch '{branch}'. Save your changes first — \
             `save_changes` will move the work to a feature branch."
        )));
    }

    let dirty = status.dirty_files();
    if !dirty.is_empty() {
        let listed: Vec<String> = dirty.iter().take(5).map(|f| format!("`{f}`")).collect();
        let extra = dirty.len().saturating_sub(5);
        let mut listing = listed.join(", ");
        if extra > 0 {
            listing.push_str(&format!(" … and {extra} more"));
        }
        return Err(AppError::Validation(format!(
            "You have unsaved changes ({listing}). Run `save_changes` first so nothing is lost."
        )));
    }

    // Push; a push-protection rejection feeds the recovery loop. After a
    // previous rejection was sanitized, retry with force-with-lease (the
    // local history was rewound, so a plain push can be non-fast-forward).
    let recovering = session.last_action.as_deref() == Some("policy_recovery");
    let outcome = if recovering {
        policy::retry_push_safely(&driver, &branch).await?;
        PushOutcome::Success {
            branch: branch.clone(),
        }
    } else {
        driver
            .push(
                &branch,
                PushOptions {
                    set_upstream: true,
                    ..Default::default()
                },
            )
            .await?
    };

    if let PushOutcome::PolicyRejection { raw_error, .. } = outcome {
        let (report, sanitize) = policy::handle_push_rejection(&driver, &raw_error).await;
        state
            .sessions
            .record_action(session.id, "policy_recovery")
            .await?;
        return Ok(render_policy_rejection(&report, sanitize.success));
    }

    // Open the pull request.
    let default_branch = state
        .github
        .get_repo(&token, &repo.owner, &repo.name)
        .await
        .ok()
        .and_then(|r| r.default_branch)
        .unwrap_or_else(|| "main".to_string());

    let title = arg_str(args, "title")
        .map(String::from)
        .or_else(|| session.task_description.clone())
        .unwrap_or_else(|| format!("Feature: {}", slug::slugify(&branch)));
    let body = match arg_str(args, "description") {
        Some(description) => format!("{description}\n\n{PR_FOOTER}"),
        None => PR_FOOTER.to_string(),
    };

    let pr = match state
        .github
        .create_pull_request(
            &token,
            &repo.owner,
            &repo.name,
            &title,
            &body,
            &branch,
            &default_branch,
            arg_bool(args, "isDraft"),
        )
        .await
    {
        Ok(pr) => pr,
        Err(AppError::GitHub { status, message })
            if message.to_lowercase().contains("already exists") =>
        {
            tracing::debug!(status, "PR already exists, looking it up");
            state
                .github
                .find_open_pr(&token, &repo.owner, &repo.name, &branch)
                .await?
                .ok_or(AppError::GitHub { status, message })?
        }
        Err(other) => return Err(other),
    };

    state
        .sessions
        .set_pr(session.id, pr.id, pr.number, &pr.html_url, pr.created_at)
        .await?;
    state.auth.increment_pr_usage(user.id).await?;

    let out = format!(
        "## 🎉 Sent for review\n\n\
         Your branch **{branch}** is on GitHub and pull request **#{}** is open:\n\n\
         {}\n\nYour teammates can review it now. I'll keep tracking it in this session.",
        pr.number, pr.html_url
    );

    Ok(with_json_block(
        &out,
        &json!({
            "pushed": true,
            "branch": branch,
            "pr_number": pr.number,
            "pr_url": pr.html_url,
            "draft": arg_bool(args, "isDraft"),
        }),
    ))
}

fn render_policy_rejection(report: &policy::ViolationReport, sanitized: bool) -> String {
    let mut out = format!("## 🚨 Critical Error\n\n{}\n", report.message);

    if !report.violations.is_empty() {
        out.push_str("\n**Where GitHub found it:**\n");
        for violation in report.violations.iter().take(5) {
            match violation.line {
                Some(line) => out.push_str(&format!(
                    "- `{}` line {line} — {}\n",
                    violation.file, violation.secret_type
                )),
                None => out.push_str(&format!(
                    "- `{}` — {}\n",
                    violation.file, violation.secret_type
                )),
            }
        }
        let extra = report.violations.len().saturating_sub(5);
        if extra > 0 {
            out.push_str(&format!("- … and {extra} more\n"));
        }
    }

    if sanitized {
        out.push_str(
            "\nI've already removed the blocked commit from history — your files are \
             untouched and still contain your work.\n",
        );
    } else {
        out.push_str("\nI couldn't rewind the blocked commit automatically; we'll sort it out together.\n");
    }

    out.push_str("\n**What you can do:**\n");
    out.push_str("- Remove the secret from the file(s) above\n");
    out.push_str("- Save the file(s)\n");
    out.push_str("- Try `push_for_review` again — I'll re-push safely\n");

    with_json_block(
        &out,
        &json!({
            "pushed": false,
            "policy_rejection": report,
            "history_sanitized": sanitized,
        }),
    )
}
