//! rmcp client handler

use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::NotificationContext;
use rmcp::RoleClient;
use tracing::info;

/// Client-side handler identifying mcpscope to the server
#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    server_name: String,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(server_name: &str) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("mcpscope-{}", server_name),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("mcpscope Inspector".to_string()),
                    icons: None,
                    website_url: None,
                    ..Default::default()
                },
                meta: None,
            },
            server_name: server_name.to_string(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    // The catalog is fetched once per connection; a change only shows up after reconnect.
    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server_name = self.server_name.clone();
        async move {
            info!(
                server = %server_name,
                "[McpClientHandler] Server reported tools/list_changed; reconnect to refresh the catalog"
            );
        }
    }
}
