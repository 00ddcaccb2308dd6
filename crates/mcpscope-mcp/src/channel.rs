//! A live rmcp client session exposed as a [`Channel`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mcpscope_core::{Channel, ChannelId, ClosedNotifier, ToolDescriptor, TransportError};
use parking_lot::Mutex;
use rmcp::model::{CallToolRequestParams, Tool};
use rmcp::service::{Peer, RunningService, RunningServiceCancellationToken};
use rmcp::RoleClient;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::handler::McpClientHandler;

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

pub struct RmcpChannel {
    id: ChannelId,
    server_name: String,
    peer: Peer<RoleClient>,
    cancel: Mutex<Option<RunningServiceCancellationToken>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
    notifier: ClosedNotifier,
}

impl RmcpChannel {
    /// Take ownership of a running client and start watching it.
    ///
    /// The watcher task owns the service. When the service stops while the
    /// notifier is still armed, the stop was not requested by us and is
    /// reported as an unsolicited closure.
    pub fn spawn(server_name: &str, client: McpClient, notifier: ClosedNotifier) -> Arc<Self> {
        let peer = client.peer().clone();
        let cancel = client.cancellation_token();
        let closed = Arc::new(AtomicBool::new(false));

        let watcher = tokio::spawn({
            let closed = Arc::clone(&closed);
            let notifier = notifier.clone();
            let server_name = server_name.to_string();
            async move {
                let reason = match client.waiting().await {
                    Ok(quit) => format!("service stopped: {:?}", quit),
                    Err(e) => format!("service task failed: {}", e),
                };
                closed.store(true, Ordering::SeqCst);

                if notifier.is_armed() {
                    warn!(
                        server = %server_name,
                        channel_id = notifier.channel_id(),
                        reason = %reason,
                        "[RmcpChannel] Channel closed unexpectedly"
                    );
                    notifier.notify(reason);
                } else {
                    debug!(
                        server = %server_name,
                        channel_id = notifier.channel_id(),
                        "[RmcpChannel] Service stopped after close"
                    );
                }
            }
        });

        Arc::new(Self {
            id: notifier.channel_id(),
            server_name: server_name.to_string(),
            peer,
            cancel: Mutex::new(Some(cancel)),
            watcher: Mutex::new(Some(watcher)),
            closed,
            notifier,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Convert an rmcp tool into the catalog representation
pub(crate) fn tool_descriptor(tool: &Tool) -> ToolDescriptor {
    let mut descriptor = ToolDescriptor::new(tool.name.to_string())
        .with_input_schema(Value::Object(tool.input_schema.as_ref().clone()));
    if let Some(description) = tool.description.as_ref() {
        descriptor = descriptor.with_description(description.to_string());
    }
    descriptor
}

#[async_trait]
impl Channel for RmcpChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(format!(
                "channel {} to '{}' is closed",
                self.id, self.server_name
            )));
        }
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| TransportError::request("tools/list", e))?;

        debug!(
            server = %self.server_name,
            tool_count = tools.len(),
            "[RmcpChannel] Listed tools"
        );
        Ok(tools.iter().map(tool_descriptor).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(format!(
                "channel {} to '{}' is closed",
                self.id, self.server_name
            )));
        }

        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                name: name.to_string().into(),
                arguments: arguments.as_object().cloned(),
                task: None,
                meta: None,
            })
            .await
            .map_err(|e| TransportError::request("tools/call", e))?;

        serde_json::to_value(result).map_err(|e| TransportError::request("tools/call", e))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.notifier.disarm();

        let Some(cancel) = self.cancel.lock().take() else {
            return Ok(());
        };
        info!(
            server = %self.server_name,
            channel_id = self.id,
            "[RmcpChannel] Closing channel"
        );
        cancel.cancel();

        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher
                .await
                .map_err(|e| TransportError::Closed(format!("watcher task failed: {}", e)))?;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
