//! MCP tool registry and dispatcher.
//!
//! Each tool declares an explicit JSON schema; arguments are validated and
//! coerced against it before the handler runs. Every tool returns a
//! `{content: [{type: "text", text: <markdown>}]}` envelope; failures are
//! rendered through the error translator — raw technical detail is logged,
//! never shown.

pub mod auth_tools;
pub mod git_tools;
pub mod repo_tools;
pub mod session_tools;
pub mod workflow_tools;

use std::path::PathBuf;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{Repository, Session, User};
use crate::state::AppState;
use crate::translate::{Severity, TranslatedError};

// ── Definitions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The full tool catalog, in presentation order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let mut defs = auth_tools::definitions();
    defs.extend(git_tools::definitions());
    defs.extend(repo_tools::definitions());
    defs.extend(workflow_tools::definitions());
    defs.extend(session_tools::definitions());
    defs
}

// ── Execution ───────────────────────────────────────────────────────────

/// Execute a tool by name. The returned value is the MCP `result` payload.
pub async fn execute(state: &AppState, name: &str, arguments: &Value) -> Value {
    let Some(definition) = tool_definitions().into_iter().find(|d| d.name == name) else {
        return error_envelope(&format!("Unknown tool: {name}"));
    };

    let arguments = match validate_arguments(&definition.input_schema, arguments) {
        Ok(v) => v,
        Err(problem) => {
            return envelope(
                &render_translated(&TranslatedError {
                    user_message: problem.clone(),
                    technical_details: problem,
                    suggested_actions: vec!["Adjust the input and try again".into()],
                    severity: Severity::Warning,
                    category: crate::translate::Category::Validation,
                    code: None,
                    affected_files: Vec::new(),
                }),
                true,
            )
        }
    };

    let result = dispatch(state, name, &arguments).await;
    match result {
        Ok(markdown) => envelope(&markdown, false),
        Err(error) => {
            tracing::warn!(tool = name, error = %error, "tool failed");
            let translated = state.translator.translate(&error);
            tracing::debug!(detail = %translated.technical_details, "translated error detail");
            envelope(&render_translated(&translated), true)
        }
    }
}

async fn dispatch(state: &AppState, name: &str, args: &Value) -> AppResult<String> {
    match name {
        "authenticate_github" | "check_auth_status" | "logout" => {
            auth_tools::handle(state, name, args).await
        }
        "git_status" | "git_commit" | "git_push" | "git_pull" | "git_clone" | "git_checkout" => {
            git_tools::handle(state, name, args).await
        }
        "list_repositories" | "clone_and_setup_repo" => {
            repo_tools::handle(state, name, args).await
        }
        "get_repo_status" | "save_changes" | "push_for_review" => {
            workflow_tools::handle(state, name, args).await
        }
        "list_sessions" | "get_active_session" | "resume_session" => {
            session_tools::handle(state, name, args).await
        }
        other => Err(AppError::Validation(format!("Unknown tool: {other}"))),
    }
}

// ── Response envelope ───────────────────────────────────────────────────

pub fn envelope(markdown: &str, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": markdown }],
        "isError": is_error,
    })
}

fn error_envelope(message: &str) -> Value {
    envelope(message, true)
}

/// Markdown block with an icon-prefixed severity heading, plain-language
/// explanation, affected files (first five), and suggested actions.
pub fn render_translated(translated: &TranslatedError) -> String {
    let heading = match translated.severity {
        Severity::Critical => "## 🚨 Critical Error",
        Severity::Error => "## ❌ Error",
        Severity::Warning => "## ⚠️ Warning",
        Severity::Info => "## ℹ️ Info",
    };

    let mut out = format!("{heading}\n\n{}\n", translated.user_message);

    if !translated.affected_files.is_empty() {
        out.push_str("\n**Affected files:**\n");
        for file in translated.affected_files.iter().take(5) {
            out.push_str(&format!("- `{file}`\n"));
        }
        let extra = translated.affected_files.len().saturating_sub(5);
        if extra > 0 {
            out.push_str(&format!("- … and {extra} more\n"));
        }
    }

    if !translated.suggested_actions.is_empty() {
        out.push_str("\n**What you can do:**\n");
        for action in &translated.suggested_actions {
            out.push_str(&format!("- {action}\n"));
        }
    }

    out
}

/// Append the fenced JSON view the agent can parse.
pub fn with_json_block(markdown: &str, payload: &Value) -> String {
    let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| "{}".to_string());
    format!("{markdown}\n\n```json\n{pretty}\n```")
}

// ── Argument validation & coercion ──────────────────────────────────────

/// Validate `arguments` against a tool schema: required fields must be
/// present, typed fields are coerced (string → number/bool, number →
/// string) where the intent is unambiguous, bounds are enforced.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<Value, String> {
    let supplied = arguments.as_object().cloned().unwrap_or_default();
    let properties = schema["properties"].as_object().cloned().unwrap_or_default();
    let empty = Vec::new();
    let required: Vec<&str> = schema["required"]
        .as_array()
        .unwrap_or(&empty)
        .iter()
        .filter_map(|v| v.as_str())
        .collect();

    for field in &required {
        let missing = match supplied.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        };
        if missing {
            return Err(format!("Missing required argument: {field}"));
        }
    }

    let mut coerced = Map::new();
    for (key, value) in supplied {
        let Some(spec) = properties.get(&key) else {
            // Unknown arguments are dropped rather than rejected.
            continue;
        };
        let value = coerce(spec, &key, value)?;
        check_bounds(spec, &key, &value)?;
        coerced.insert(key, value);
    }

    Ok(Value::Object(coerced))
}

fn coerce(spec: &Value, key: &str, value: Value) -> Result<Value, String> {
    let wanted = spec["type"].as_str().unwrap_or("string");
    let ok = match (wanted, &value) {
        ("string", Value::String(_)) => true,
        ("integer", Value::Number(n)) => n.is_i64() || n.is_u64(),
        ("number", Value::Number(_)) => true,
        ("boolean", Value::Bool(_)) => true,
        _ => false,
    };
    if ok {
        return Ok(value);
    }

    match (wanted, value) {
        ("integer", Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("Argument {key} must be a whole number")),
        ("number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("Argument {key} must be a number")),
        ("boolean", Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("Argument {key} must be true or false")),
        },
        ("string", Value::Number(n)) => Ok(Value::String(n.to_string())),
        ("integer", Value::Number(n)) => Err(format!(
            "Argument {key} must be a whole number, got {n}"
        )),
        (wanted, other) => Err(format!(
            "Argument {key} must be a {wanted}, got {other}"
        )),
    }
}

fn check_bounds(spec: &Value, key: &str, value: &Value) -> Result<(), String> {
    if let Value::String(s) = value {
        if let Some(min) = spec["minLength"].as_u64() {
            if (s.chars().count() as u64) < min {
                return Err(format!("Argument {key} must be at least {min} characters"));
            }
        }
        if let Some(max) = spec["maxLength"].as_u64() {
            if (s.chars().count() as u64) > max {
                return Err(format!("Argument {key} must be at most {max} characters"));
            }
        }
        if let Some(allowed) = spec["enum"].as_array() {
            if !allowed.iter().any(|a| a == value) {
                let options: Vec<&str> = allowed.iter().filter_map(|a| a.as_str()).collect();
                return Err(format!(
                    "Argument {key} must be one of: {}",
                    options.join(", ")
                ));
            }
        }
    }
    if let Value::Number(n) = value {
        if let (Some(v), Some(min)) = (n.as_i64(), spec["minimum"].as_i64()) {
            if v < min {
                return Err(format!("Argument {key} must be at least {min}"));
            }
        }
        if let (Some(v), Some(max)) = (n.as_i64(), spec["maximum"].as_i64()) {
            if v > max {
                return Err(format!("Argument {key} must be at most {max}"));
            }
        }
    }
    Ok(())
}

// ── Shared argument helpers ─────────────────────────────────────────────

pub fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

pub fn arg_bool(args: &Value, key: &str) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub fn arg_u32(args: &Value, key: &str) -> Option<u32> {
    args.get(key).and_then(|v| v.as_u64()).map(|n| n as u32)
}

pub fn arg_uuid(args: &Value, key: &str) -> AppResult<Uuid> {
    arg_str(args, key)
        .ok_or_else(|| AppError::Validation(format!("Missing required argument: {key}")))
        .and_then(|s| {
            Uuid::parse_str(s)
                .map_err(|_| AppError::Validation(format!("Argument {key} must be a UUID")))
        })
}

/// Load the calling user from the mandatory `userId` argument.
pub async fn require_user(state: &AppState, args: &Value) -> AppResult<User> {
    let user_id = arg_uuid(args, "userId")?;
    state.auth.require_user(user_id).await
}

// ── Repository-context resolution ───────────────────────────────────────

#[derive(Debug)]
pub struct RepoContext {
    pub local_path: PathBuf,
    pub repo: Option<Repository>,
    pub session: Option<Session>,
}

impl RepoContext {
    pub fn managed(&self) -> AppResult<&Repository> {
        self.repo.as_ref().ok_or_else(|| {
            AppError::Validation(
                "That folder isn't a managed repository. Use `clone_and_setup_repo` first.".into(),
            )
        })
    }
}

/// Shared resolution: explicit `localPath` first (managed or not), then
/// `repoId` (must be owned and cloned), then the user's active session.
pub async fn resolve_repo_context(
    state: &AppState,
    user: &User,
    args: &Value,
) -> AppResult<RepoContext> {
    let active_session = state.sessions.active_for_user(user.id).await?;

    if let Some(path) = arg_str(args, "localPath") {
        let repo = state.repos.find_by_local_path(user.id, path).await?;
        let session = match (&repo, &active_session) {
            (Some(repo), Some(session)) if session.repository_id == repo.id => {
                active_session.clone()
            }
            _ => None,
        };
        return Ok(RepoContext {
            local_path: PathBuf::from(path),
            repo,
            session,
        });
    }

    if let Some(repo_id) = arg_str(args, "repoId") {
        let repo_id = Uuid::parse_str(repo_id)
            .map_err(|_| AppError::Validation("Argument repoId must be a UUID".into()))?;
        let repo = state
            .repos
            .find_owned(repo_id, user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("repository".into()))?;
        if !repo.is_cloned {
            return Err(AppError::NotCloned);
        }
        let local_path = repo
            .local_path
            .clone()
            .ok_or(AppError::NotCloned)
            .map(PathBuf::from)?;
        let session = active_session
            .filter(|s| s.repository_id == repo.id);
        return Ok(RepoContext {
            local_path,
            repo: Some(repo),
            session,
        });
    }

    if let Some(session) = active_session {
        let repo = state
            .repos
            .find(session.repository_id)
            .await?
            .ok_or_else(|| AppError::NotFound("repository".into()))?;
        if !repo.is_cloned {
            return Err(AppError::NotCloned);
        }
        let local_path = repo
            .local_path
            .clone()
            .ok_or(AppError::NotCloned)
            .map(PathBuf::from)?;
        return Ok(RepoContext {
            local_path,
            repo: Some(repo),
            session: Some(session),
        });
    }

    Err(AppError::Validation(
        "No repository found. Pass a repoId or localPath, or start one with `clone_and_setup_repo`."
            .into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "userId": { "type": "string" },
                "message": { "type": "string", "minLength": 1, "maxLength": 500 },
                "perPage": { "type": "integer", "minimum": 1, "maximum": 100 },
                "sort": { "type": "string", "enum": ["created", "updated", "pushed", "full_name"] },
                "isDraft": { "type": "boolean" }
            },
            "required": ["userId", "message"]
        })
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let err = validate_arguments(&schema(), &json!({ "userId": "u" })).unwrap_err();
        assert!(err.contains("message"));
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let err =
            validate_arguments(&schema(), &json!({ "userId": "u", "message": "" })).unwrap_err();
        assert!(err.contains("message"));
    }

    #[test]
    fn string_numbers_are_coerced() {
        let out = validate_arguments(
            &schema(),
            &json!({ "userId": "u", "message": "hi", "perPage": "25" }),
        )
        .unwrap();
        assert_eq!(out["perPage"], json!(25));
    }

    #[test]
    fn string_bools_are_coerced() {
        let out = validate_arguments(
            &schema(),
            &json!({ "userId": "u", "message": "hi", "isDraft": "true" }),
        )
        .unwrap();
        assert_eq!(out["isDraft"], json!(true));
    }

    #[test]
    fn bounds_are_enforced() {
        let err = validate_arguments(
            &schema(),
            &json!({ "userId": "u", "message": "hi", "perPage": 500 }),
        )
        .unwrap_err();
        assert!(err.contains("at most 100"));

        let long = "x".repeat(501);
        let err =
            validate_arguments(&schema(), &json!({ "userId": "u", "message": long })).unwrap_err();
        assert!(err.contains("at most 500"));
    }

    #[test]
    fn enums_are_enforced() {
        let err = validate_arguments(
            &schema(),
            &json!({ "userId": "u", "message": "hi", "sort": "alphabetical" }),
        )
        .unwrap_err();
        assert!(err.contains("one of"));
    }

    #[test]
    fn unknown_arguments_are_dropped() {
        let out = validate_arguments(
            &schema(),
            &json!({ "userId": "u", "message": "hi", "mystery": 42 }),
        )
        .unwrap();
        assert!(out.get("mystery").is_none());
    }

    #[test]
    fn every_tool_has_a_wellformed_schema() {
        for def in tool_definitions() {
            assert!(!def.name.is_empty());
            assert!(!def.description.is_empty());
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(def.input_schema["properties"].is_object(), "{}", def.name);
            // Required fields must exist in properties.
            if let Some(required) = def.input_schema["required"].as_array() {
                for field in required {
                    let field = field.as_str().unwrap();
                    assert!(
                        def.input_schema["properties"].get(field).is_some(),
                        "{}: required field {field} missing from properties",
                        def.name
                    );
                }
            }
        }
    }

    #[test]
    fn tool_catalog_is_complete() {
        let names: Vec<String> = tool_definitions().into_iter().map(|d| d.name).collect();
        for expected in [
            "authenticate_github",
            "check_auth_status",
            "logout",
            "git_status",
            "git_commit",
            "git_push",
            "git_pull",
            "git_clone",
            "git_checkout",
            "list_repositories",
            "clone_and_setup_repo",
            "get_repo_status",
            "save_changes",
            "push_for_review",
            "list_sessions",
            "get_active_session",
            "resume_session",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(names.len(), 17);
    }

    #[test]
    fn render_shows_five_files_then_count() {
        let translated = TranslatedError {
            user_message: "conflict".into(),
            technical_details: String::new(),
            suggested_actions: vec!["fix it".into()],
            severity: Severity::Error,
            category: crate::translate::Category::MergeConflict,
            code: None,
            affected_files: (0..8).map(|i| format!("file{i}.rs")).collect(),
        };
        let text = render_translated(&translated);
        assert!(text.contains("file4.rs"));
        assert!(!text.contains("file5.rs"));
        assert!(text.contains("… and 3 more"));
        assert!(text.starts_with("## ❌ Error"));
    }

    #[test]
    fn severity_headings() {
        for (severity, heading) in [
            (Severity::Critical, "## 🚨 Critical Error"),
            (Severity::Error, "## ❌ Error"),
            (Severity::Warning, "## ⚠️ Warning"),
            (Severity::Info, "## ℹ️ Info"),
        ] {
            let translated = TranslatedError {
                user_message: "m".into(),
                technical_details: String::new(),
                suggested_actions: vec![],
                severity,
                category: crate::translate::Category::Unknown,
                code: None,
                affected_files: vec![],
            };
            assert!(render_translated(&translated).starts_with(heading));
        }
    }

    #[test]
    fn json_block_is_appended_fenced() {
        let text = with_json_block("## Saved", &json!({ "branch_created": true }));
        assert!(text.contains("```json"));
        assert!(text.contains("\"branch_created\": true"));
        assert!(text.trim_end().ends_with("```"));
    }
}
