//! rmcp transport adapter against real MCP servers
//!
//! HTTP cases run [`HttpTestServer`] in-process; stdio cases spawn the
//! `mcpscope-test-server` binary built from this crate.

use std::sync::Arc;
use std::time::Duration;

use mcpscope_core::{create_shared_event_bus, EventReceiver};
use mcpscope_gateway::ConnectionManager;
use mcpscope_mcp::RmcpTransportAdapter;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::mcp_server::HttpTestServer;
use tests::{
    events, init_test_tracing, wait_until, ConnectionState, DomainEvent, ManagerConfig,
    ManagerError, ServerSpec,
};

const TEST_SERVER: &str = env!("CARGO_BIN_EXE_mcpscope-test-server");

async fn manager() -> (Arc<ConnectionManager>, EventReceiver) {
    init_test_tracing();
    let adapter = RmcpTransportAdapter::new().with_handshake_timeout(Duration::from_secs(10));
    let config = ManagerConfig::default()
        .with_connect_timeout(Duration::from_secs(15))
        .with_call_timeout(Duration::from_secs(10))
        .with_close_timeout(Duration::from_secs(2));
    let manager = ConnectionManager::new(Arc::new(adapter), create_shared_event_bus(), config);
    let events = manager.subscribe();
    manager.init().await.expect("manager init");
    (Arc::new(manager), events)
}

fn text_of(result: &Value) -> &str {
    result["content"][0]["text"].as_str().unwrap_or_default()
}

fn tool_names(conn: &mcpscope_gateway::Connection) -> Vec<String> {
    conn.catalog().iter().map(|t| t.name.clone()).collect()
}

fn is_failed(event: &DomainEvent, server: &str) -> bool {
    matches!(
        event,
        DomainEvent::ConnectionStateChanged {
            server_name,
            state: ConnectionState::Failed,
            ..
        } if server_name == server
    )
}

// ============================================================================
// Streamable HTTP
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_http_connect_list_and_call() {
    let server = HttpTestServer::start().await;
    let (manager, _events) = manager().await;
    manager
        .register("remote", ServerSpec::sse(server.url.clone()))
        .await
        .unwrap();

    let conn = manager.connect("remote", None, None).await.unwrap();
    assert_eq!(tool_names(&conn), vec!["echo", "slow"]);
    assert_eq!(
        conn.catalog()[0].input_schema["properties"]["text"]["type"],
        json!("string")
    );
    assert_eq!(conn.catalog()[0].description.as_deref(), Some("Return the text argument"));

    let routed = manager.list_tools();
    assert_eq!(routed.len(), 2);
    assert!(routed.iter().all(|t| t.server_name == "remote"));

    let result = manager
        .call("remote", "echo", json!({ "text": "hello" }), None, None)
        .await
        .unwrap();
    assert_eq!(text_of(&result), "hello");
    assert_eq!(result["isError"], json!(false));

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_session_token_sent_as_bearer() {
    let server = HttpTestServer::start().await;
    let (manager, _events) = manager().await;
    manager
        .register("secure", ServerSpec::sse(server.url.clone()).with_auth(true))
        .await
        .unwrap();

    manager
        .get_user_connection("s1", "secure", Some("tok1"), None)
        .await
        .unwrap();
    let result = manager
        .call("secure", "echo", json!({ "text": "hi" }), Some("s1"), None)
        .await
        .unwrap();
    assert_eq!(text_of(&result), "hi");

    let seen = server.authorization_headers();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|v| v == "Bearer tok1"));

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_disconnect_is_not_reported_as_loss() {
    let server = HttpTestServer::start().await;
    let (manager, mut events) = manager().await;
    manager
        .register("remote", ServerSpec::sse(server.url.clone()))
        .await
        .unwrap();
    manager.connect("remote", None, None).await.unwrap();
    events::collect_events(&mut events, Duration::from_millis(50)).await;

    assert!(manager.disconnect("remote").await);

    let emitted = events::collect_events(&mut events, Duration::from_millis(300)).await;
    assert_eq!(
        events::states_for(&emitted, "remote", None),
        vec![ConnectionState::Disconnected]
    );
    let status = &manager.status(None)[0];
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(status.last_error.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_call_in_flight_during_disconnect() {
    let server = HttpTestServer::start().await;
    let (manager, _events) = manager().await;
    manager
        .register("remote", ServerSpec::sse(server.url.clone()))
        .await
        .unwrap();
    manager.connect("remote", None, None).await.unwrap();

    let caller = Arc::clone(&manager);
    let call = tokio::spawn(async move {
        caller
            .call("remote", "slow", json!({ "ms": 2000 }), None, None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.disconnect("remote").await;

    let result = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("call ends with the connection")
        .unwrap();
    assert_eq!(result.unwrap_err(), ManagerError::not_connected("remote", None));
}

// ============================================================================
// stdio child process
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_stdio_connect_list_and_call() {
    let (manager, _events) = manager().await;
    manager
        .register("child", ServerSpec::stdio(TEST_SERVER, vec![]))
        .await
        .unwrap();

    let conn = manager.connect("child", None, None).await.unwrap();
    assert_eq!(tool_names(&conn), vec!["echo", "slow", "crash"]);

    let result = manager
        .call("child", "echo", json!({ "text": "over stdio" }), None, None)
        .await
        .unwrap();
    assert_eq!(text_of(&result), "over stdio");

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stdio_disconnect_is_not_reported_as_loss() {
    let (manager, mut events) = manager().await;
    manager
        .register("child", ServerSpec::stdio(TEST_SERVER, vec![]))
        .await
        .unwrap();
    manager.connect("child", None, None).await.unwrap();

    assert!(manager.disconnect("child").await);

    let emitted = events::collect_events(&mut events, Duration::from_millis(300)).await;
    assert!(!emitted.iter().any(|e| is_failed(e, "child")));
    assert!(manager.last_error("child", None).is_none());
    assert_eq!(manager.status(None)[0].state, ConnectionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stdio_server_exit_evicts_connection() {
    let (manager, mut events) = manager().await;
    manager
        .register("child", ServerSpec::stdio(TEST_SERVER, vec![]))
        .await
        .unwrap();
    let first = manager.connect("child", None, None).await.unwrap();

    let result = manager
        .call("child", "crash", json!({}), None, None)
        .await
        .unwrap();
    assert_eq!(text_of(&result), "exiting");

    let failed = events::wait_for_event(&mut events, Duration::from_secs(5), |e| {
        is_failed(e, "child")
    })
    .await;
    assert!(failed.is_some());

    let watched = Arc::clone(&manager);
    assert!(
        wait_until(Duration::from_secs(2), || watched.connections().is_empty()).await
    );
    let status = &manager.status(None)[0];
    assert!(!status.connected);
    assert_eq!(status.state, ConnectionState::Failed);
    assert!(status
        .last_error
        .as_ref()
        .unwrap()
        .message
        .starts_with("connection lost"));

    // A fresh process serves the next connect
    let second = manager.connect("child", None, None).await.unwrap();
    assert_ne!(first.channel_id(), second.channel_id());
    let result = manager
        .call("child", "echo", json!({ "text": "again" }), None, None)
        .await
        .unwrap();
    assert_eq!(text_of(&result), "again");

    manager.shutdown().await;
}
