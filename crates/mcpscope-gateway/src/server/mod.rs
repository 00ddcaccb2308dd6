//! HTTP server exposing the Connection Manager
//!
//! JSON routes under `/api`; the caller's session travels in the
//! `X-Session-Id` header where an operation is session-scoped.

mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

pub use error::{ApiError, ApiResult};
pub use handlers::{AppState, SESSION_HEADER};

use crate::pool::ConnectionManager;

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6277,
            enable_cors: true,
        }
    }
}

impl GatewayConfig {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

pub struct GatewayServer {
    config: GatewayConfig,
    manager: Arc<ConnectionManager>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, manager: Arc<ConnectionManager>) -> Self {
        Self { config, manager }
    }

    pub fn build_router(&self) -> Router {
        let state = AppState {
            manager: Arc::clone(&self.manager),
        };

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/api/servers",
                get(handlers::list_servers).post(handlers::register_server),
            )
            .route(
                "/api/servers/{name}",
                get(handlers::get_server).delete(handlers::remove_server),
            )
            .route("/api/servers/{name}/connect", post(handlers::connect_server))
            .route(
                "/api/servers/{name}/disconnect",
                post(handlers::disconnect_server),
            )
            .route("/api/servers/{name}/error", get(handlers::last_error))
            .route(
                "/api/servers/{name}/tools/{tool}/call",
                post(handlers::call_tool),
            )
            .route("/api/status", get(handlers::status))
            .route("/api/tools", get(handlers::list_tools))
            .route("/api/connections", get(handlers::connections))
            .route(
                "/api/sessions/{session}",
                get(handlers::session_connections).delete(handlers::drop_session),
            )
            .route(
                "/api/sessions/{session}/servers/{name}",
                post(handlers::open_session_connection).delete(handlers::drop_session_connection),
            )
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Bind and serve until the listener fails
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.addr()?;
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("[Gateway] Listening on {}", self.config.base_url());

        axum::serve(listener, router)
            .await
            .context("gateway server failed")?;
        Ok(())
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("[Gateway] Server error: {:#}", e);
            }
        })
    }
}
