//! mcpscope inspector
//!
//! Registers the servers from an `mcpServers` file and serves the Connection
//! Manager over HTTP until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use mcpscope_core::{create_shared_event_bus, DomainEvent, EventReceiver, ServersFile};
use mcpscope_gateway::{ConnectionManager, GatewayServer};
use mcpscope_mcp::RmcpTransportAdapter;
use tracing::{debug, error, info, warn};

mod config;

use config::{logs_dir, InspectorConfig, APP_NAME};

/// Console plus daily-rotated file logging. The returned guard flushes the
/// file writer and must live as long as the program.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let logs_dir = logs_dir();
    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
    }

    let (file_writer, guard) = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(APP_NAME)
        .filename_suffix("log")
        .build(&logs_dir)
    {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(e) => {
            eprintln!("Warning: File logging disabled: {}", e);
            (None, None)
        }
    };

    // RUST_LOG wins over the defaults
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "info,mcpscope=debug,mcpscope_core=debug,mcpscope_gateway=debug,mcpscope_mcp=debug,rmcp=warn",
        )
    });

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

async fn register_servers_file(manager: &ConnectionManager, config: &InspectorConfig) {
    let Some(path) = &config.servers_file else {
        info!("[Inspector] No servers file; start with an empty registry");
        return;
    };

    let file = match ServersFile::load(path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("[Inspector] Ignoring servers file: {:#}", e);
            return;
        }
    };

    let (configs, rejected) = file.into_configs();
    for (name, err) in &rejected {
        warn!(server = %name, "[Inspector] Skipped server: {}", err);
    }
    let registered = configs.len();
    for server in configs {
        manager.register_config(server).await;
    }
    info!(
        path = %path.display(),
        registered,
        rejected = rejected.len(),
        "[Inspector] Servers file loaded"
    );
}

/// Mirror lifecycle events into the log
async fn log_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match &event {
            DomainEvent::ConnectionStateChanged {
                server_name,
                session_id,
                state,
                message,
            } => debug!(
                server = %server_name,
                session = ?session_id,
                state = %state,
                message = message.as_deref().unwrap_or(""),
                "[Inspector] Connection state changed"
            ),
            DomainEvent::ToolsDiscovered {
                server_name,
                session_id,
                tool_count,
            } => debug!(
                server = %server_name,
                session = ?session_id,
                tool_count,
                "[Inspector] Tools discovered"
            ),
            other => debug!(event = other.type_name(), "[Inspector] Event"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _guard = init_tracing();

    info!(
        "[Inspector] Starting {} v{}",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );

    let config = InspectorConfig::from_env()?;
    let adapter = Arc::new(RmcpTransportAdapter::new());
    let manager = Arc::new(ConnectionManager::new(
        adapter,
        create_shared_event_bus(),
        config.manager.clone(),
    ));
    tokio::spawn(log_events(manager.subscribe()));
    manager.init().await?;
    register_servers_file(&manager, &config).await;

    let server = GatewayServer::new(config.gateway.clone(), Arc::clone(&manager));
    let mut handle = server.spawn();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("[Inspector] Failed to listen for Ctrl-C: {}", e);
            }
            info!("[Inspector] Shutting down");
        }
        _ = &mut handle => {
            warn!("[Inspector] Gateway stopped");
        }
    }

    handle.abort();
    manager.shutdown().await;
    info!("[Inspector] Bye");
    Ok(())
}
