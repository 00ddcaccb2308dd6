//! rmcp implementation of the Transport Adapter port

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcpscope_core::{
    Channel, ClosedNotifier, ServerConfig, TransportAdapter, TransportConfig, TransportError,
};
use tracing::debug;

use crate::{http, stdio};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens stdio and streamable-HTTP channels with rmcp
#[derive(Debug, Clone)]
pub struct RmcpTransportAdapter {
    handshake_timeout: Duration,
}

impl RmcpTransportAdapter {
    pub fn new() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Bound on the MCP `initialize` exchange alone
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Default for RmcpTransportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportAdapter for RmcpTransportAdapter {
    async fn open(
        &self,
        server: &ServerConfig,
        token: Option<&str>,
        notifier: ClosedNotifier,
    ) -> Result<Arc<dyn Channel>, TransportError> {
        let channel: Arc<dyn Channel> = match &server.transport {
            TransportConfig::Stdio { command, args, env } => {
                if token.is_some() {
                    debug!(server = %server.name, "Token not used by stdio transport");
                }
                stdio::open(
                    &server.name,
                    command,
                    args,
                    env,
                    self.handshake_timeout,
                    notifier,
                )
                .await?
            }
            TransportConfig::Sse { url, headers } => {
                http::open(
                    &server.name,
                    url,
                    headers,
                    token,
                    self.handshake_timeout,
                    notifier,
                )
                .await?
            }
        };
        Ok(channel)
    }
}
