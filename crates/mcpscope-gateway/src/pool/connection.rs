//! Live connection representation
//!
//! A [`Connection`] owns exactly one channel and the tool catalog fetched
//! when that channel was opened. Shared and session-scoped connections use
//! the same type; a session connection additionally carries its session id
//! and the caller's token.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mcpscope_core::{Channel, ChannelId, ToolDescriptor, TransportKind};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use zeroize::Zeroizing;

/// Identity of a connection in the ledger and in closure routing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub server_name: String,
    pub session_id: Option<String>,
}

impl ConnectionKey {
    pub fn shared(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            session_id: None,
        }
    }

    pub fn session(session_id: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            session_id: Some(session_id.into()),
        }
    }

    pub fn is_session(&self) -> bool {
        self.session_id.is_some()
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.session_id {
            Some(session) => write!(f, "{}@{}", self.server_name, session),
            None => f.write_str(&self.server_name),
        }
    }
}

/// Statistics for a live connection
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub connected_at: DateTime<Utc>,
    /// Calls that completed with a response
    pub calls_served: u64,
    /// Calls that failed in transport or timed out
    pub failed_calls: u64,
}

pub struct Connection {
    key: ConnectionKey,
    transport: TransportKind,
    channel: Arc<dyn Channel>,
    catalog: Vec<ToolDescriptor>,
    token: Option<Zeroizing<String>>,
    stats: RwLock<ConnectionStats>,
    /// Flipped once when the connection is disconnected or lost
    retired: watch::Sender<bool>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("transport", &self.transport)
            .field("channel_id", &self.channel.id())
            .field("tools", &self.catalog.len())
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl Connection {
    pub fn new(
        key: ConnectionKey,
        transport: TransportKind,
        channel: Arc<dyn Channel>,
        catalog: Vec<ToolDescriptor>,
        token: Option<Zeroizing<String>>,
    ) -> Self {
        Self {
            key,
            transport,
            channel,
            catalog,
            token,
            stats: RwLock::new(ConnectionStats {
                connected_at: Utc::now(),
                calls_served: 0,
                failed_calls: 0,
            }),
            retired: watch::Sender::new(false),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn server_name(&self) -> &str {
        &self.key.server_name
    }

    pub fn session_id(&self) -> Option<&str> {
        self.key.session_id.as_deref()
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Wake every call still waiting on this connection
    pub fn retire(&self) {
        self.retired.send_replace(true);
    }

    pub fn is_retired(&self) -> bool {
        *self.retired.borrow()
    }

    /// Resolves once [`retire`](Self::retire) has been called
    pub async fn retired(&self) {
        let mut rx = self.retired.subscribe();
        let _ = rx.wait_for(|retired| *retired).await;
    }

    /// Tool catalog in server order
    pub fn catalog(&self) -> &[ToolDescriptor] {
        &self.catalog
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.catalog.iter().any(|t| t.name == name)
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn record_call(&self, success: bool) {
        let mut stats = self.stats.write();
        if success {
            stats.calls_served += 1;
        } else {
            stats.failed_calls += 1;
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Serializable snapshot. Never includes the token.
    pub fn info(&self) -> ConnectionInfo {
        let stats = self.stats.read();
        ConnectionInfo {
            server_name: self.key.server_name.clone(),
            session_id: self.key.session_id.clone(),
            transport: self.transport,
            channel_id: self.channel.id(),
            connected_at: stats.connected_at,
            tool_count: self.catalog.len(),
            calls_served: stats.calls_served,
            failed_calls: stats.failed_calls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub server_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub transport: TransportKind,
    pub channel_id: ChannelId,
    pub connected_at: DateTime<Utc>,
    pub tool_count: usize,
    pub calls_served: u64,
    pub failed_calls: u64,
}
