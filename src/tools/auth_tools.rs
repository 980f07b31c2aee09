//! Authentication tools: `authenticate_github`, `check_auth_status`,
//! `logout`.

use serde_json::{json, Value};

use super::{arg_str, arg_uuid, require_user, ToolDefinition};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "authenticate_github".to_string(),
            description: "Start the GitHub sign-in flow. Returns a link the user opens in \
                their browser; the flow completes on the local callback page."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": {
                        "type": "string",
                        "description": "Existing user id, if re-authenticating"
                    },
                    "redirectUri": {
                        "type": "string",
                        "description": "Override the OAuth redirect URI"
                    }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "check_auth_status".to_string(),
            description: "Check whether the user is signed in to GitHub and their stored \
                credentials still work."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" }
                },
                "required": ["userId"]
            }),
        },
        ToolDefinition {
            name: "logout".to_string(),
            description: "Sign the user out of GitHub: removes the stored credential from \
                the keychain and marks the account logged out."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User id (UUID)" }
                },
                "required": ["userId"]
            }),
        },
    ]
}

pub async fn handle(state: &AppState, name: &str, args: &Value) -> AppResult<String> {
    match name {
        "authenticate_github" => authenticate_github(state, args).await,
        "check_auth_status" => check_auth_status(state, args).await,
        "logout" => logout(state, args).await,
        other => Err(AppError::Validation(format!("Unknown auth tool: {other}"))),
    }
}

async fn authenticate_github(state: &AppState, args: &Value) -> AppResult<String> {
    let redirect_uri = arg_str(args, "redirectUri").map(String::from);
    let initiation = state.auth.initiate_oauth(redirect_uri).await;

    Ok(format!(
        "## 🔐 Sign in to GitHub\n\n\
         1. Open this link in your browser:\n\n   {}\n\n\
         2. Approve the access request on GitHub.\n\
         3. You'll land on a confirmation page — keep the user id it shows.\n\n\
         The link expires in {} minutes.",
        initiation.url,
        initiation.expires_in / 60
    ))
}

async fn check_auth_status(state: &AppState, args: &Value) -> AppResult<String> {
    let user_id = arg_uuid(args, "userId")?;
    let Some(user) = state.auth.find_user(user_id).await? else {
        return Ok("## ⚠️ Warning\n\n\
            I couldn't find an account for that id.\n\n\
            **What you can do:**\n\
            - Run `authenticate_github` to sign in\n"
            .to_string());
    };

    match state.auth.get_access_token(user.id).await? {
        Some(token) => {
            let mut out = format!(
                "## ✅ Signed in\n\n\
                 You're signed in to GitHub as **{}** ({} plan).\n",
                user.username,
                user.tier().as_str()
            );
            if let Ok(rate) = state.github.get_rate_limit(&token).await {
                out.push_str(&format!(
                    "\nGitHub API budget: {} of {} requests remaining this hour.\n",
                    rate.remaining, rate.limit
                ));
            }
            Ok(out)
        }
        None => Ok(format!(
            "## ⚠️ Session expired\n\n\
             Your GitHub session for **{}** has expired (`session_expired`). \
             Your work is safe — you just need to sign in again.\n\n\
             **What you can do:**\n\
             - Run `authenticate_github` to sign in again\n",
            user.username
        )),
    }
}

async fn logout(state: &AppState, args: &Value) -> AppResult<String> {
    let user = require_user(state, args).await?;
    state.auth.logout(user.id).await?;
    Ok(format!(
        "## 👋 Signed out\n\n\
         **{}** is signed out of GitHub. Stored credentials were removed.\n\n\
         Run `authenticate_github` whenever you want to sign back in.",
        user.username
    ))
}
