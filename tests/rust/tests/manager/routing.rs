//! Tool Router tests

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::{Harness, ManagerError};

#[tokio::test]
async fn test_list_all_is_empty_without_connections() {
    let harness = Harness::new().await;
    harness.stdio("py").await;

    assert!(harness.manager.list_tools().is_empty());
}

#[tokio::test]
async fn test_list_all_tags_tools_in_registration_order() {
    let harness = Harness::new().await;
    harness.stdio("py").await;
    harness.sse("web", false).await;
    harness.adapter.set_tools("py", &["run", "lint"]);
    harness.adapter.set_tools("web", &["fetch"]);

    harness.manager.connect("web", None, None).await.unwrap();
    harness.manager.connect("py", None, None).await.unwrap();

    let tagged: Vec<(String, String)> = harness
        .manager
        .list_tools()
        .into_iter()
        .map(|t| (t.server_name, t.tool.name))
        .collect();
    assert_eq!(
        tagged,
        vec![
            ("py".to_string(), "run".to_string()),
            ("py".to_string(), "lint".to_string()),
            ("web".to_string(), "fetch".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_list_all_skips_session_connections() {
    let harness = Harness::new().await;
    harness.sse("secure", true).await;
    harness
        .manager
        .get_user_connection("s1", "secure", Some("tok"), None)
        .await
        .unwrap();

    assert!(harness.manager.list_tools().is_empty());
}

#[tokio::test]
async fn test_call_returns_result_verbatim() {
    let harness = Harness::new().await;
    harness.sse("web", false).await;
    harness.manager.connect("web", None, None).await.unwrap();

    let result = harness
        .manager
        .call("web", "echo", json!({"text": "hi"}), None, None)
        .await
        .unwrap();

    assert_eq!(
        result,
        json!({
            "content": [{ "type": "text", "text": "web:echo" }],
            "isError": false,
            "arguments": { "text": "hi" },
        })
    );
}

#[tokio::test]
async fn test_unknown_tool_fails_without_io() {
    let harness = Harness::new().await;
    harness.stdio("py").await;
    harness.manager.connect("py", None, None).await.unwrap();
    let opens = harness.adapter.open_count();
    let lists = harness.adapter.list_count();

    let err = harness
        .manager
        .call("py", "nope", json!({}), None, None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ManagerError::ToolNotFound {
            server: "py".into(),
            tool: "nope".into(),
        }
    );
    assert_eq!(harness.adapter.call_count(), 0);
    assert_eq!(harness.adapter.open_count(), opens);
    assert_eq!(harness.adapter.list_count(), lists);
    let record = harness.manager.last_error("py", None).unwrap();
    assert!(record.message.contains("nope"));
}

#[tokio::test]
async fn test_call_unregistered_server() {
    let harness = Harness::new().await;

    let err = harness
        .manager
        .call("ghost", "echo", json!({}), None, None)
        .await
        .unwrap_err();

    assert_eq!(err, ManagerError::NotRegistered("ghost".into()));
}

#[tokio::test]
async fn test_transport_failure_is_returned_and_recorded() {
    let harness = Harness::new().await;
    harness.stdio("py").await;
    harness.adapter.fail_calls(
        "py",
        Some(mcpscope_core::TransportError::request("tools/call", "broken pipe")),
    );
    harness.manager.connect("py", None, None).await.unwrap();

    let err = harness
        .manager
        .call("py", "echo", json!({}), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Transport(_)));
    let status = &harness.manager.status(None)[0];
    assert!(status.connected);
    assert!(status
        .last_error
        .as_ref()
        .unwrap()
        .message
        .contains("broken pipe"));
}
