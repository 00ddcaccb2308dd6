//! Session Connection Table
//!
//! Per-session connections for servers that require per-user auth. Each
//! (session, server) pair has its own channel and token and never shares
//! either with another session or with the shared pool. For servers that do
//! not require auth, a session simply uses the shared connection and no
//! session state is created.

use std::sync::Arc;

use mcpscope_core::{ChannelId, ServerConfig};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::connection::{Connection, ConnectionKey};
use super::connector::Connector;
use super::lifecycle::{ConnectionTable, Join};
use super::shared::ConnectionPool;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub session_id: String,
    pub server_name: String,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            server_name: server_name.into(),
        }
    }
}

pub struct SessionConnectionTable {
    table: Arc<ConnectionTable<SessionKey>>,
    connector: Arc<Connector>,
    pool: Arc<ConnectionPool>,
}

impl SessionConnectionTable {
    pub fn new(connector: Arc<Connector>, pool: Arc<ConnectionPool>) -> Self {
        Self {
            table: ConnectionTable::new(),
            connector,
            pool,
        }
    }

    /// Join or start the connection `session_id` uses for `server`
    pub fn get_or_create(&self, session_id: &str, server: &ServerConfig, token: Option<&str>) -> Join {
        if !server.requires_auth {
            debug!(
                server = %server.name,
                session = %session_id,
                "Server does not require auth; using shared connection"
            );
            return self.pool.connect(server, None);
        }

        let key = SessionKey::new(session_id, &server.name);
        let token = token.map(|t| Zeroizing::new(t.to_string()));
        self.table.acquire(&key, || {
            self.connector.connect(
                server.clone(),
                ConnectionKey::session(session_id, &server.name),
                token,
            )
        })
    }

    /// Live session connection; a closed one is evicted and reported as lost
    pub fn live(&self, session_id: &str, server_name: &str) -> Option<Arc<Connection>> {
        let key = SessionKey::new(session_id, server_name);
        let conn = self.table.get(&key)?;
        if conn.is_closed() {
            if let Some(evicted) = self.table.evict(&key, conn.channel_id()) {
                self.connector.mark_lost(&evicted, "channel closed");
            }
            return None;
        }
        Some(conn)
    }

    pub fn is_connected(&self, session_id: &str, server_name: &str) -> bool {
        self.table
            .is_connected(&SessionKey::new(session_id, server_name))
    }

    pub fn is_stale(&self, session_id: &str, server_name: &str) -> bool {
        self.table
            .get(&SessionKey::new(session_id, server_name))
            .is_some_and(|c| c.is_closed())
    }

    pub fn is_current(&self, session_id: &str, server_name: &str, channel_id: ChannelId) -> bool {
        self.table
            .get(&SessionKey::new(session_id, server_name))
            .map(|c| c.channel_id() == channel_id && !c.is_closed())
            .unwrap_or(false)
    }

    /// Whether any session holds (or is opening) a connection to `server_name`
    pub fn has_server(&self, server_name: &str) -> bool {
        self.table.contains_where(|k| k.server_name == server_name)
    }

    /// Server names `session_id` holds connections for, sorted
    pub fn session_servers(&self, session_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .keys_where(|k| k.session_id == session_id)
            .into_iter()
            .map(|k| k.server_name)
            .collect();
        names.sort();
        names
    }

    /// Close one session connection
    pub async fn drop_connection(&self, session_id: &str, server_name: &str) -> bool {
        match self.table.remove(&SessionKey::new(session_id, server_name)).await {
            Some(conn) => {
                self.connector.close(&conn).await;
                true
            }
            None => false,
        }
    }

    /// Close every connection belonging to `session_id`
    pub async fn drop_session(&self, session_id: &str) -> usize {
        let keys = self.table.keys_where(|k| k.session_id == session_id);
        let mut closed = 0;
        for key in keys {
            if self.drop_connection(&key.session_id, &key.server_name).await {
                closed += 1;
            }
        }
        info!(session = %session_id, closed, "Session dropped");
        closed
    }

    /// Close every session connection to `server_name`
    pub async fn drop_server(&self, server_name: &str) -> usize {
        let keys = self.table.keys_where(|k| k.server_name == server_name);
        let mut closed = 0;
        for key in keys {
            if self.drop_connection(&key.session_id, &key.server_name).await {
                closed += 1;
            }
        }
        closed
    }

    pub fn handle_closed(
        &self,
        session_id: &str,
        server_name: &str,
        channel_id: ChannelId,
        reason: &str,
    ) -> bool {
        match self
            .table
            .evict(&SessionKey::new(session_id, server_name), channel_id)
        {
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

    pub async fn close_all(&self) -> usize {
        let keys = self.table.keys_where(|_| true);
        let mut closed = 0;
        for key in keys {
            if self.drop_connection(&key.session_id, &key.server_name).await {
                closed += 1;
            }
        }
        closed
    }
}
