//! MCP server — JSON-RPC 2.0 dispatch over newline-delimited stdio frames.
//!
//! Protocol messages own stdout exclusively; every log line in this process
//! goes to stderr. Tool invocations run concurrently — each request is
//! handled in its own task and responses are funneled through one writer.
//!
//! Supports:
//! - `initialize` — handshake
//! - `notifications/initialized` — client ready notification
//! - `tools/list` — list all tools
//! - `tools/call` — execute a tool
//! - `ping` — health check

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::state::AppState;
use crate::tools;

const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
const MCP_SERVER_NAME: &str = "gitflow-backend";

/// Per-tool execution timeout. Clones dominate; everything else is fast.
const TOOL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Handle one JSON-RPC request. `None` means no response is written
/// (notifications and malformed ids).
pub async fn handle_request(state: &AppState, request: Value) -> Option<Value> {
    let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let id = request.get("id").cloned();
    let params = request.get("params").cloned().unwrap_or(json!({}));

    tracing::debug!(method, "mcp request");

    let result = match method {
        "initialize" => Ok(handle_initialize()),
        "notifications/initialized" => return None,
        "tools/list" => Ok(handle_tools_list()),
        "tools/call" => handle_tools_call(state, &params).await,
        "ping" => Ok(json!({})),
        _ => Err(json_rpc_error(-32601, "Method not found")),
    };

    let id = id?;
    Some(match result {
        Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    })
}

fn handle_initialize() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false },
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

fn handle_tools_list() -> Value {
    let tools: Vec<Value> = tools::tool_definitions()
        .into_iter()
        .map(|td| {
            json!({
                "name": td.name,
                "description": td.description,
                "inputSchema": td.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

async fn handle_tools_call(state: &AppState, params: &Value) -> Result<Value, Value> {
    let tool_name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| json_rpc_error(-32602, "Missing 'name' parameter"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    tracing::info!(tool = tool_name, "tools/call");

    match tokio::time::timeout(TOOL_TIMEOUT, tools::execute(state, tool_name, &arguments)).await {
        Ok(result) => Ok(result),
        Err(_) => Ok(tools::envelope(
            &format!(
                "Tool '{tool_name}' timed out after {}s. It may still be running — check \
                 the repository state before retrying.",
                TOOL_TIMEOUT.as_secs()
            ),
            true,
        )),
    }
}

fn json_rpc_error(code: i32, message: &str) -> Value {
    json!({ "code": code, "message": message })
}

/// Read frames from stdin until EOF or shutdown; write responses to stdout.
/// Each request runs in its own task so slow git or network operations don't
/// block other tool invocations.
pub async fn run_stdio(state: AppState, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    // Single writer task: stdout is the protocol channel, one frame per line.
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = rx.recv().await {
            if stdout.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut in_flight = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    tracing::info!("stdin closed, draining in-flight tool calls");
                    break;
                };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let request: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "discarding malformed frame");
                        let _ = tx
                            .send(
                                json!({
                                    "jsonrpc": "2.0",
                                    "id": Value::Null,
                                    "error": json_rpc_error(-32700, "Parse error"),
                                })
                                .to_string(),
                            )
                            .await;
                        continue;
                    }
                };

                let state = state.clone();
                let tx = tx.clone();
                in_flight.spawn(async move {
                    if let Some(response) = handle_request(&state, request).await {
                        let _ = tx.send(response.to_string()).await;
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("shutdown requested, draining in-flight tool calls");
                    break;
                }
            }
        }
    }

    // Drain: let running tool calls finish before the writer goes away.
    while in_flight.join_next().await.is_some() {}
    drop(tx);
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new_test()
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let response = handle_request(
            &state(),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }),
        )
        .await
        .expect("response");
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], "gitflow-backend");
        assert_eq!(response["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn initialized_notification_has_no_response() {
        let response = handle_request(
            &state(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn tools_list_contains_the_catalog() {
        let response = handle_request(
            &state(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
        )
        .await
        .expect("response");
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 17);
        assert!(tools.iter().any(|t| t["name"] == "save_changes"));
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn unknown_method_is_32601() {
        let response = handle_request(
            &state(),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "resources/list" }),
        )
        .await
        .expect("response");
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let response = handle_request(
            &state(),
            json!({ "jsonrpc": "2.0", "id": 4, "method": "ping" }),
        )
        .await
        .expect("response");
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn tools_call_without_name_is_32602() {
        let response = handle_request(
            &state(),
            json!({ "jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {} }),
        )
        .await
        .expect("response");
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn tools_call_with_bad_arguments_returns_validation_envelope() {
        let response = handle_request(
            &state(),
            json!({
                "jsonrpc": "2.0",
                "id": 6,
                "method": "tools/call",
                "params": { "name": "save_changes", "arguments": { "userId": "u" } }
            }),
        )
        .await
        .expect("response");
        let result = &response["result"];
        assert_eq!(result["isError"], true);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("message"));
    }

    #[tokio::test]
    async fn authenticate_github_works_without_database() {
        let response = handle_request(
            &state(),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": { "name": "authenticate_github", "arguments": {} }
            }),
        )
        .await
        .expect("response");
        let result = &response["result"];
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("github.com/login/oauth/authorize"));
        assert!(text.contains("state="));
    }
}
