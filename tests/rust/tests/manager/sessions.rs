//! Session Connection Table tests

use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tests::{ConnectionState, Harness, ManagerError};

#[tokio::test]
async fn test_sessions_get_independent_connections() {
    let harness = Harness::new().await;
    harness.sse("secure", true).await;

    let s1 = harness
        .manager
        .get_user_connection("s1", "secure", Some("tok1"), None)
        .await
        .unwrap();
    let s2 = harness
        .manager
        .get_user_connection("s2", "secure", Some("tok2"), None)
        .await
        .unwrap();

    assert_ne!(s1.channel_id(), s2.channel_id());
    assert_eq!(s1.session_id(), Some("s1"));
    assert_eq!(s2.session_id(), Some("s2"));
    assert_eq!(
        harness.adapter.tokens_for("secure"),
        vec![Some("tok1".to_string()), Some("tok2".to_string())]
    );
}

#[tokio::test]
async fn test_drop_session_leaves_other_sessions() {
    let harness = Harness::new().await;
    harness.sse("secure", true).await;
    harness
        .manager
        .get_user_connection("s1", "secure", Some("tok1"), None)
        .await
        .unwrap();
    harness
        .manager
        .get_user_connection("s2", "secure", Some("tok2"), None)
        .await
        .unwrap();

    assert_eq!(harness.manager.drop_session("s1").await, 1);

    assert_eq!(harness.manager.status(Some("s1"))[0].user_connected, Some(false));
    assert_eq!(harness.manager.status(Some("s2"))[0].user_connected, Some(true));
    assert!(harness.manager.session_connections("s1").is_empty());
    assert_eq!(harness.manager.session_connections("s2"), vec!["secure"]);
}

#[tokio::test]
async fn test_session_requests_coalesce_per_session() {
    let harness = Harness::new().await;
    harness.sse("secure", true).await;
    harness
        .adapter
        .set_open_delay("secure", Duration::from_millis(50));

    let calls = (0..4).map(|_| {
        harness
            .manager
            .get_user_connection("s1", "secure", Some("tok1"), None)
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(harness.adapter.open_count(), 1);
}

#[tokio::test]
async fn test_non_auth_server_uses_shared_connection() {
    let harness = Harness::new().await;
    harness.stdio("py").await;

    let conn = harness
        .manager
        .get_user_connection("s1", "py", Some("ignored"), None)
        .await
        .unwrap();

    assert_eq!(conn.session_id(), None);
    assert_eq!(harness.adapter.tokens_for("py"), vec![None]);
    assert!(harness.manager.session_connections("s1").is_empty());

    let status = &harness.manager.status(Some("s1"))[0];
    assert!(status.connected);
    assert_eq!(status.user_connected, Some(false));
}

#[tokio::test]
async fn test_session_listing_is_sorted() {
    let harness = Harness::new().await;
    harness.sse("zeta", true).await;
    harness.sse("alpha", true).await;

    for name in ["zeta", "alpha"] {
        harness
            .manager
            .get_user_connection("s1", name, Some("tok"), None)
            .await
            .unwrap();
    }

    assert_eq!(harness.manager.session_connections("s1"), vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn test_drop_single_session_connection() {
    let harness = Harness::new().await;
    harness.sse("secure", true).await;
    harness
        .manager
        .get_user_connection("s1", "secure", Some("tok1"), None)
        .await
        .unwrap();

    assert!(harness.manager.drop_user_connection("s1", "secure").await);
    assert!(!harness.manager.drop_user_connection("s1", "secure").await);

    let status = &harness.manager.status(Some("s1"))[0];
    assert_eq!(status.user_connected, Some(false));
    assert_eq!(status.user_state, Some(ConnectionState::Disconnected));
    assert_eq!(harness.adapter.open_channels(), 0);
}

#[tokio::test]
async fn test_session_call_routes_to_session_connection() {
    let harness = Harness::new().await;
    harness.sse("secure", true).await;

    // No shared connection and no session connection yet
    let err = harness
        .manager
        .call("secure", "echo", json!({}), Some("s1"), None)
        .await
        .unwrap_err();
    assert_eq!(err, ManagerError::not_connected("secure", Some("s1")));

    harness
        .manager
        .get_user_connection("s1", "secure", Some("tok1"), None)
        .await
        .unwrap();
    let result = harness
        .manager
        .call("secure", "echo", json!({"q": 1}), Some("s1"), None)
        .await
        .unwrap();
    assert_eq!(result["arguments"], json!({"q": 1}));

    // Another session has nothing
    let err = harness
        .manager
        .call("secure", "echo", json!({}), Some("s2"), None)
        .await
        .unwrap_err();
    assert_eq!(err, ManagerError::not_connected("secure", Some("s2")));
}

#[tokio::test]
async fn test_session_failure_is_recorded_per_session() {
    let harness = Harness::new().await;
    harness.sse("secure", true).await;
    harness.adapter.fail_open(
        "secure",
        Some(mcpscope_core::TransportError::Handshake("401 Unauthorized".into())),
    );

    let err = harness
        .manager
        .get_user_connection("s1", "secure", Some("expired"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Transport(_)));
    let record = harness.manager.last_error("secure", Some("s1")).unwrap();
    assert_eq!(record.session_id.as_deref(), Some("s1"));
    assert!(record.message.contains("401"));
    assert!(harness.manager.last_error("secure", Some("s2")).is_none());
    assert!(harness.manager.last_error("secure", None).is_none());
}
