use serde_json::json;

use gitflow_backend::state::AppState;
use gitflow_backend::tools;

#[test]
fn every_tool_except_authenticate_requires_user_id() {
    for def in tools::tool_definitions() {
        let required: Vec<&str> = def.input_schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        if def.name == "authenticate_github" {
            // First-time users have no id yet.
            assert!(!required.contains(&"userId"), "{}", def.name);
        } else {
            assert!(required.contains(&"userId"), "{} must require userId", def.name);
        }
    }
}

#[test]
fn repo_scoped_tools_accept_repo_id_and_local_path() {
    for name in ["git_status", "git_commit", "git_push", "git_pull", "get_repo_status", "save_changes"] {
        let def = tools::tool_definitions()
            .into_iter()
            .find(|d| d.name == name)
            .unwrap();
        let properties = def.input_schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("repoId"), "{name} missing repoId");
        assert!(properties.contains_key("localPath"), "{name} missing localPath");
    }
}

#[test]
fn list_repositories_bounds_match_the_github_api() {
    let def = tools::tool_definitions()
        .into_iter()
        .find(|d| d.name == "list_repositories")
        .unwrap();
    let per_page = &def.input_schema["properties"]["perPage"];
    assert_eq!(per_page["minimum"], 1);
    assert_eq!(per_page["maximum"], 100);
    let sort = def.input_schema["properties"]["sort"]["enum"]
        .as_array()
        .unwrap();
    assert_eq!(sort.len(), 4);
}

#[test]
fn save_changes_message_bounds() {
    let def = tools::tool_definitions()
        .into_iter()
        .find(|d| d.name == "save_changes")
        .unwrap();
    let message = &def.input_schema["properties"]["message"];
    assert_eq!(message["minLength"], 1);
    assert_eq!(message["maxLength"], 500);
}

#[test]
fn push_for_review_bounds() {
    let def = tools::tool_definitions()
        .into_iter()
        .find(|d| d.name == "push_for_review")
        .unwrap();
    assert_eq!(def.input_schema["properties"]["title"]["maxLength"], 256);
    assert_eq!(
        def.input_schema["properties"]["description"]["maxLength"],
        65536
    );
}

#[tokio::test]
async fn unknown_tool_returns_error_envelope() {
    let state = AppState::new_test();
    let result = tools::execute(&state, "frobnicate_repo", &json!({})).await;
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Unknown tool"));
}

#[tokio::test]
async fn invalid_user_id_yields_validation_message_not_panic() {
    let state = AppState::new_test();
    let result = tools::execute(
        &state,
        "check_auth_status",
        &json!({ "userId": "not-a-uuid" }),
    )
    .await;
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("UUID"));
}

#[tokio::test]
async fn responses_are_single_text_content_items() {
    let state = AppState::new_test();
    let result = tools::execute(&state, "authenticate_github", &json!({})).await;
    let content = result["content"].as_array().unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0]["type"], "text");
    assert!(content[0]["text"].is_string());
}
