//! Tool Router
//!
//! Aggregates the cached catalogs of live shared connections and dispatches
//! tool calls to the right connection. Tool names are checked against the
//! cached catalog before any I/O; results are returned verbatim.

use std::sync::Arc;
use std::time::Duration;

use mcpscope_core::{ManagerError, ManagerResult, RoutedTool};
use serde_json::Value;
use tracing::{debug, warn};

use super::connection::Connection;
use super::ledger::StatusLedger;
use super::registry::ConfigRegistry;
use super::session::SessionConnectionTable;
use super::shared::ConnectionPool;

pub struct ToolRouter {
    registry: Arc<ConfigRegistry>,
    pool: Arc<ConnectionPool>,
    sessions: Arc<SessionConnectionTable>,
    ledger: Arc<StatusLedger>,
    default_timeout: Duration,
}

impl ToolRouter {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        pool: Arc<ConnectionPool>,
        sessions: Arc<SessionConnectionTable>,
        ledger: Arc<StatusLedger>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            pool,
            sessions,
            ledger,
            default_timeout,
        }
    }

    /// Every live shared connection's catalog, tagged with the server name.
    /// Servers appear in registration order, tools in catalog order.
    pub fn list_all(&self) -> Vec<RoutedTool> {
        let mut tools = Vec::new();
        for server in self.registry.list() {
            let Some(conn) = self.pool.live(&server.name) else {
                continue;
            };
            tools.extend(conn.catalog().iter().map(|tool| RoutedTool {
                server_name: server.name.clone(),
                tool: tool.clone(),
            }));
        }
        debug!(tool_count = tools.len(), "[ToolRouter] Listed tools");
        tools
    }

    /// Resolve the connection a call would use, without any I/O
    pub fn resolve(&self, server_name: &str, session_id: Option<&str>) -> ManagerResult<Arc<Connection>> {
        let server = self
            .registry
            .get(server_name)
            .ok_or_else(|| ManagerError::NotRegistered(server_name.to_string()))?;

        let session = session_id.filter(|_| server.requires_auth);
        let conn = match session {
            Some(session) => self.sessions.live(session, server_name),
            None => self.pool.live(server_name),
        };
        conn.ok_or_else(|| ManagerError::not_connected(server_name, session))
    }

    pub async fn call(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Value,
        session_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> ManagerResult<Value> {
        let conn = self.resolve(server_name, session_id)?;

        if !conn.has_tool(tool_name) {
            let error = ManagerError::ToolNotFound {
                server: server_name.to_string(),
                tool: tool_name.to_string(),
            };
            self.ledger.record_error(conn.key(), error.to_string());
            debug!(server = %server_name, tool = %tool_name, "[ToolRouter] Tool not in catalog");
            return Err(error);
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        debug!(
            server = %server_name,
            tool = %tool_name,
            session = ?conn.session_id(),
            channel_id = conn.channel_id(),
            "[ToolRouter] Dispatching tool call"
        );

        let dispatch = tokio::time::timeout(timeout, conn.channel().call_tool(tool_name, arguments));
        let outcome = tokio::select! {
            biased;
            _ = conn.retired() => None,
            outcome = dispatch => Some(outcome),
        };

        match outcome {
            None => {
                debug!(
                    server = %server_name,
                    tool = %tool_name,
                    channel_id = conn.channel_id(),
                    "[ToolRouter] Connection went away during call"
                );
                Err(ManagerError::not_connected(server_name, conn.session_id()))
            }
            Some(Ok(Ok(_))) if !self.is_current(&conn) => {
                Err(ManagerError::not_connected(server_name, conn.session_id()))
            }
            Some(Ok(Ok(result))) => {
                conn.record_call(true);
                Ok(result)
            }
            Some(Ok(Err(e))) => {
                conn.record_call(false);
                Err(self.call_failed(&conn, tool_name, e.into()))
            }
            Some(Err(_)) => {
                conn.record_call(false);
                let error = ManagerError::timeout(format!("tools/call {}", tool_name), timeout);
                Err(self.call_failed(&conn, tool_name, error))
            }
        }
    }

    /// Whether `conn` still serves its key and has not been retired
    fn is_current(&self, conn: &Connection) -> bool {
        if conn.is_retired() {
            return false;
        }
        match conn.session_id() {
            Some(session) => self
                .sessions
                .is_current(session, conn.server_name(), conn.channel_id()),
            None => self.pool.is_current(conn.server_name(), conn.channel_id()),
        }
    }

    /// A call on a connection that was disconnected or lost meanwhile reports
    /// `NotConnected`; anything else is recorded against the connection.
    fn call_failed(&self, conn: &Connection, tool_name: &str, error: ManagerError) -> ManagerError {
        if !self.is_current(conn) {
            return ManagerError::not_connected(conn.server_name(), conn.session_id());
        }

        warn!(
            server = %conn.server_name(),
            tool = %tool_name,
            session = ?conn.session_id(),
            error = %error,
            "[ToolRouter] Tool call failed"
        );
        self.ledger.record_error(conn.key(), error.to_string());
        error
    }
}
