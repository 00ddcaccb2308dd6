//! Connect/close mechanics shared by the pool and the session table
//!
//! The connector turns a [`ServerConfig`] into a live [`Connection`]: open a
//! channel through the Transport Adapter, fetch the tool catalog, and keep the
//! ledger and the event bus in step with every transition. It also remembers
//! which key each open channel belongs to so closure notifications can be
//! routed back.

use std::collections::HashMap;
use std::sync::Arc;

use mcpscope_core::{
    next_channel_id, Channel, ChannelClosed, ChannelId, ClosedNotifier, ConnectionState,
    DomainEvent, EventSender, ManagerConfig, ManagerError, ManagerResult, ServerConfig,
    TransportAdapter, TransportError,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::connection::{Connection, ConnectionKey};
use super::ledger::StatusLedger;

pub struct Connector {
    adapter: Arc<dyn TransportAdapter>,
    ledger: Arc<StatusLedger>,
    events: EventSender,
    config: ManagerConfig,
    closed_tx: mpsc::UnboundedSender<ChannelClosed>,
    channels: Mutex<HashMap<ChannelId, ConnectionKey>>,
}

impl Connector {
    /// Returns the connector and the receiving end of its closure notifications
    pub fn new(
        adapter: Arc<dyn TransportAdapter>,
        ledger: Arc<StatusLedger>,
        events: EventSender,
        config: ManagerConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelClosed>) {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            adapter,
            ledger,
            events,
            config,
            closed_tx,
            channels: Mutex::new(HashMap::new()),
        });
        (connector, closed_rx)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<StatusLedger> {
        &self.ledger
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Key owning an open channel
    pub fn key_for(&self, channel_id: ChannelId) -> Option<ConnectionKey> {
        self.channels.lock().get(&channel_id).cloned()
    }

    pub fn forget_channel(&self, channel_id: ChannelId) {
        self.channels.lock().remove(&channel_id);
    }

    /// Build the connect future for one attempt. Bounded by `connect_timeout`.
    pub fn connect(
        self: &Arc<Self>,
        server: ServerConfig,
        key: ConnectionKey,
        token: Option<Zeroizing<String>>,
    ) -> impl std::future::Future<Output = ManagerResult<Arc<Connection>>> + Send + 'static {
        let connector = Arc::clone(self);
        async move { connector.establish(server, key, token).await }
    }

    async fn establish(
        &self,
        server: ServerConfig,
        key: ConnectionKey,
        token: Option<Zeroizing<String>>,
    ) -> ManagerResult<Arc<Connection>> {
        self.transition(&key, ConnectionState::Connecting, None);
        info!(
            server = %key.server_name,
            session = ?key.session_id,
            transport = %server.transport.description(),
            "Connecting"
        );

        let timeout = self.config.connect_timeout;
        let deadline = Instant::now() + timeout;
        let channel_id = next_channel_id();
        let notifier = ClosedNotifier::new(channel_id, self.closed_tx.clone());
        self.channels.lock().insert(channel_id, key.clone());

        let token_ref = token.as_ref().map(|t| t.as_str());
        let channel = match tokio::time::timeout_at(
            deadline,
            self.adapter.open(&server, token_ref, notifier),
        )
        .await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                self.forget_channel(channel_id);
                return Err(self.fail(&key, e.into()));
            }
            Err(_) => {
                self.forget_channel(channel_id);
                return Err(self.fail(&key, ManagerError::timeout(format!("connect '{}'", key), timeout)));
            }
        };

        let catalog = match tokio::time::timeout_at(deadline, channel.list_tools()).await {
            Ok(Ok(catalog)) => catalog,
            Ok(Err(e)) => {
                self.discard(&channel).await;
                return Err(self.fail(&key, e.into()));
            }
            Err(_) => {
                self.discard(&channel).await;
                return Err(self.fail(&key, ManagerError::timeout(format!("connect '{}'", key), timeout)));
            }
        };

        if channel.is_closed() {
            self.discard(&channel).await;
            return Err(self.fail(
                &key,
                TransportError::Closed("channel closed during connect".to_string()).into(),
            ));
        }

        let tool_count = catalog.len();
        let conn = Arc::new(Connection::new(
            key.clone(),
            server.kind(),
            channel,
            catalog,
            token,
        ));

        self.transition(&key, ConnectionState::Connected, None);
        self.events.emit(DomainEvent::ToolsDiscovered {
            server_name: key.server_name.clone(),
            session_id: key.session_id.clone(),
            tool_count,
        });
        info!(
            server = %key.server_name,
            session = ?key.session_id,
            channel_id = conn.channel_id(),
            tool_count,
            "Connected"
        );
        Ok(conn)
    }

    /// Close a connection on request
    pub async fn close(&self, conn: &Connection) {
        conn.retire();
        self.forget_channel(conn.channel_id());
        self.close_channel(conn.channel()).await;
        self.transition(conn.key(), ConnectionState::Disconnected, None);
        info!(
            server = %conn.server_name(),
            session = ?conn.session_id(),
            channel_id = conn.channel_id(),
            "Disconnected"
        );
    }

    /// Record a connection that went away on its own
    pub fn mark_lost(&self, conn: &Connection, reason: &str) {
        conn.retire();
        self.forget_channel(conn.channel_id());
        let message = format!("connection lost: {}", reason);
        warn!(
            server = %conn.server_name(),
            session = ?conn.session_id(),
            channel_id = conn.channel_id(),
            reason = %reason,
            "Connection lost"
        );
        self.ledger.record_failure(conn.key(), message.clone());
        self.emit_state(conn.key(), ConnectionState::Failed, Some(message));
    }

    async fn discard(&self, channel: &Arc<dyn Channel>) {
        self.forget_channel(channel.id());
        self.close_channel(channel).await;
    }

    async fn close_channel(&self, channel: &Arc<dyn Channel>) {
        match tokio::time::timeout(self.config.close_timeout, channel.close()).await {
            Ok(Ok(())) => debug!(channel_id = channel.id(), "Channel closed"),
            Ok(Err(e)) => warn!(channel_id = channel.id(), error = %e, "Channel close failed"),
            Err(_) => warn!(
                channel_id = channel.id(),
                timeout = ?self.config.close_timeout,
                "Channel close timed out"
            ),
        }
    }

    fn fail(&self, key: &ConnectionKey, error: ManagerError) -> ManagerError {
        warn!(
            server = %key.server_name,
            session = ?key.session_id,
            error = %error,
            "Connect failed"
        );
        self.ledger.record_failure(key, error.to_string());
        self.emit_state(key, ConnectionState::Failed, Some(error.to_string()));
        error
    }

    fn transition(&self, key: &ConnectionKey, state: ConnectionState, message: Option<String>) {
        self.ledger.set_state(key, state);
        self.emit_state(key, state, message);
    }

    fn emit_state(&self, key: &ConnectionKey, state: ConnectionState, message: Option<String>) {
        self.events.emit(DomainEvent::ConnectionStateChanged {
            server_name: key.server_name.clone(),
            session_id: key.session_id.clone(),
            state,
            message,
        });
    }
}
