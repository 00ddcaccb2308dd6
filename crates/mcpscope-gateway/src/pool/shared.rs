//! Connection Pool
//!
//! Shared connections, at most one per registered server name.

use std::sync::Arc;

use mcpscope_core::{ChannelId, ServerConfig};
use tracing::debug;
use zeroize::Zeroizing;

use super::connection::{Connection, ConnectionKey};
use super::connector::Connector;
use super::lifecycle::{ConnectionTable, Join};

pub struct ConnectionPool {
    table: Arc<ConnectionTable<String>>,
    connector: Arc<Connector>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<Connector>) -> Self {
        Self {
            table: ConnectionTable::new(),
            connector,
        }
    }

    /// Join or start the connect attempt for `server`.
    ///
    /// The token reaches the adapter only when the server requires auth.
    pub fn connect(&self, server: &ServerConfig, token: Option<&str>) -> Join {
        let name = server.name.clone();
        let token = token
            .filter(|_| server.requires_auth)
            .map(|t| Zeroizing::new(t.to_string()));
        let join = self.table.acquire(&name, || {
            self.connector
                .connect(server.clone(), ConnectionKey::shared(&name), token)
        });
        if let Join::Attempt { started: false, .. } = &join {
            debug!(server = %name, "Attached to in-flight connect");
        }
        join
    }

    /// Live shared connection. A connection whose channel has closed is
    /// evicted here and reported as lost.
    pub fn live(&self, name: &str) -> Option<Arc<Connection>> {
        let key = name.to_string();
        let conn = self.table.get(&key)?;
        if conn.is_closed() {
            if let Some(evicted) = self.table.evict(&key, conn.channel_id()) {
                self.connector.mark_lost(&evicted, "channel closed");
            }
            return None;
        }
        Some(conn)
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.table.is_connected(&name.to_string())
    }

    /// Still in the table with a channel that has closed
    pub fn is_stale(&self, name: &str) -> bool {
        self.table
            .get(&name.to_string())
            .is_some_and(|c| c.is_closed())
    }

    /// Connected or connecting
    pub fn is_active(&self, name: &str) -> bool {
        self.table.contains(&name.to_string())
    }

    /// Whether `channel_id` is still the channel serving `name`
    pub fn is_current(&self, name: &str, channel_id: ChannelId) -> bool {
        self.table
            .get(&name.to_string())
            .map(|c| c.channel_id() == channel_id && !c.is_closed())
            .unwrap_or(false)
    }

    /// Close and remove. Returns false when nothing was connected.
    pub async fn disconnect(&self, name: &str) -> bool {
        match self.table.remove(&name.to_string()).await {
            Some(conn) => {
                self.connector.close(&conn).await;
                true
            }
            None => false,
        }
    }

    /// Evict after an unsolicited closure of `channel_id`
    pub fn handle_closed(&self, name: &str, channel_id: ChannelId, reason: &str) -> bool {
        match self.table.evict(&name.to_string(), channel_id) {
            Some(conn) => {
                self.connector.mark_lost(&conn, reason);
                true
            }
            None => false,
        }
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.table.connections()
    }

    /// Close every shared connection, waiting for attempts in flight
    pub async fn close_all(&self) -> usize {
        let names = self.table.keys_where(|_| true);
        let mut closed = 0;
        for name in names {
            if self.disconnect(&name).await {
                closed += 1;
            }
        }
        closed
    }
}
