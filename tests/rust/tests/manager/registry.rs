//! Configuration Registry tests

use mcpscope_core::{ServerSpec, TransportConfig, TransportKind};
use pretty_assertions::assert_eq;
use tests::{DomainEvent, Harness, ManagerError};

#[tokio::test]
async fn test_register_requires_command_or_url() {
    let harness = Harness::new().await;

    let err = harness
        .manager
        .register("empty", ServerSpec::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Validation(_)));
    assert!(harness.manager.get("empty").is_none());
}

#[tokio::test]
async fn test_register_infers_transport() {
    let harness = Harness::new().await;

    let py = harness.stdio("py").await;
    let web = harness.sse("web", false).await;

    assert_eq!(py.kind(), TransportKind::Stdio);
    assert_eq!(web.kind(), TransportKind::Sse);
}

#[tokio::test]
async fn test_command_wins_over_url() {
    let harness = Harness::new().await;
    let spec = ServerSpec {
        command: Some("node".into()),
        url: Some("http://host/sse".into()),
        ..Default::default()
    };

    let config = harness.manager.register("both", spec).await.unwrap();

    assert_eq!(config.kind(), TransportKind::Stdio);
}

#[tokio::test]
async fn test_embedded_command_arguments_are_split() {
    let harness = Harness::new().await;
    let spec = ServerSpec::stdio("npx -y \"@scope/server\"", vec![]);

    let config = harness.manager.register("npx", spec).await.unwrap();

    assert_eq!(
        config.transport,
        TransportConfig::Stdio {
            command: "npx".into(),
            args: vec!["-y".into(), "@scope/server".into()],
            env: Default::default(),
        }
    );
}

#[tokio::test]
async fn test_unbalanced_quotes_are_rejected() {
    let harness = Harness::new().await;

    let err = harness
        .manager
        .register("bad", ServerSpec::stdio("npx \"@scope/server", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn test_non_http_url_is_rejected() {
    let harness = Harness::new().await;

    let err = harness
        .manager
        .register("ftp", ServerSpec::sse("ftp://host/files"))
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn test_reregister_replaces_in_place() {
    let harness = Harness::new().await;
    harness.stdio("a").await;
    harness.stdio("b").await;
    harness.stdio("c").await;

    harness.sse("b", true).await;

    let names: Vec<String> = harness.manager.list().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    let b = harness.manager.get("b").unwrap();
    assert_eq!(b.kind(), TransportKind::Sse);
    assert!(b.requires_auth);
}

#[tokio::test]
async fn test_remove_unknown_server() {
    let harness = Harness::new().await;

    let err = harness.manager.remove("ghost").await.unwrap_err();

    assert_eq!(err, ManagerError::NotRegistered("ghost".into()));
}

#[tokio::test]
async fn test_remove_emits_event_and_forgets_status() {
    let mut harness = Harness::new().await;
    harness.stdio("py").await;
    harness.adapter.fail_open(
        "py",
        Some(mcpscope_core::TransportError::Spawn {
            command: "python".into(),
            message: "not found".into(),
        }),
    );
    let _ = harness.manager.connect("py", None, None).await;
    assert!(harness.manager.last_error("py", None).is_some());

    let removed = harness.manager.remove("py").await.unwrap();

    assert_eq!(removed.name, "py");
    assert!(harness.manager.get("py").is_none());
    assert!(harness.manager.last_error("py", None).is_none());
    let events = harness.drain_events().await;
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::ServerRemoved { server_name } if server_name == "py")));
}

#[tokio::test]
async fn test_register_emits_event() {
    let mut harness = Harness::new().await;

    harness.sse("secure", true).await;

    let events = harness.drain_events().await;
    assert_eq!(
        events,
        vec![DomainEvent::ServerRegistered {
            server_name: "secure".into(),
            transport: TransportKind::Sse,
            requires_auth: true,
        }]
    );
}
