//! ConnectionManager - the facade over registry, pool, sessions, router and ledger
//!
//! Lifecycle:
//! - `new` builds empty tables
//! - `init` starts the closure-event loop and loads persisted configs
//! - `shutdown` closes every channel, stops the loop, and clears all tables;
//!   a later `init` starts the loop again
//!
//! Closure handling: adapters report unsolicited closures with the channel id.
//! The loop evicts a key only while that channel is still the one serving it,
//! so a late notification for an older channel never removes a newer
//! connection.

use std::sync::Arc;
use std::time::Duration;

use mcpscope_core::{
    ChannelClosed, ConnectionState, DomainEvent, ErrorRecord, EventReceiver, ManagerConfig,
    ManagerError, ManagerResult, RoutedTool, ServerConfig, ServerConfigRepository, ServerSpec,
    ServerStatus, SharedEventBus, TransportAdapter,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionInfo, ConnectionKey};
use super::connector::Connector;
use super::ledger::StatusLedger;
use super::lifecycle::Join;
use super::registry::ConfigRegistry;
use super::routing::ToolRouter;
use super::session::SessionConnectionTable;
use super::shared::ConnectionPool;

pub struct ConnectionManager {
    config: ManagerConfig,
    registry: Arc<ConfigRegistry>,
    ledger: Arc<StatusLedger>,
    connector: Arc<Connector>,
    pool: Arc<ConnectionPool>,
    sessions: Arc<SessionConnectionTable>,
    router: ToolRouter,
    event_bus: SharedEventBus,
    repository: Option<Arc<dyn ServerConfigRepository>>,
    closed_rx: Mutex<Option<mpsc::UnboundedReceiver<ChannelClosed>>>,
    closure_task: Mutex<Option<ClosureTask>>,
}

/// Running closure loop; the handle gives its receiver back once stopped
struct ClosureTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<mpsc::UnboundedReceiver<ChannelClosed>>,
}

impl ConnectionManager {
    pub fn new(
        adapter: Arc<dyn TransportAdapter>,
        event_bus: SharedEventBus,
        config: ManagerConfig,
    ) -> Self {
        let registry = Arc::new(ConfigRegistry::new());
        let ledger = Arc::new(StatusLedger::new());
        let (connector, closed_rx) = Connector::new(
            adapter,
            Arc::clone(&ledger),
            event_bus.sender(),
            config.clone(),
        );
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector)));
        let sessions = Arc::new(SessionConnectionTable::new(
            Arc::clone(&connector),
            Arc::clone(&pool),
        ));
        let router = ToolRouter::new(
            Arc::clone(&registry),
            Arc::clone(&pool),
            Arc::clone(&sessions),
            Arc::clone(&ledger),
            config.call_timeout,
        );

        Self {
            config,
            registry,
            ledger,
            connector,
            pool,
            sessions,
            router,
            event_bus,
            repository: None,
            closed_rx: Mutex::new(Some(closed_rx)),
            closure_task: Mutex::new(None),
        }
    }

    /// Persist registrations and removals through `repository`, and load its
    /// configs on `init`
    pub fn with_repository(mut self, repository: Arc<dyn ServerConfigRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Start the closure loop and load persisted configs. Returns how many
    /// configs were loaded. Calling it again only reloads.
    pub async fn init(&self) -> anyhow::Result<usize> {
        let rx = self.closed_rx.lock().take();
        if let Some(rx) = rx {
            let (stop, stop_rx) = oneshot::channel();
            let handle = tokio::spawn(run_closure_loop(
                rx,
                stop_rx,
                Arc::clone(&self.connector),
                Arc::clone(&self.pool),
                Arc::clone(&self.sessions),
            ));
            *self.closure_task.lock() = Some(ClosureTask { stop, handle });
            debug!("[ConnectionManager] Closure loop started");
        }

        let Some(repository) = &self.repository else {
            return Ok(0);
        };
        let configs = repository.list().await?;
        let loaded = configs.len();
        for config in configs {
            self.insert_config(config);
        }
        info!(loaded, "[ConnectionManager] Loaded persisted server configs");
        Ok(loaded)
    }

    // ---- Configuration Registry ----

    /// Validate and register `spec` under `name`, replacing any previous
    /// config. A live connection keeps running on the config it was opened
    /// with.
    pub async fn register(&self, name: &str, spec: ServerSpec) -> ManagerResult<ServerConfig> {
        let config = ServerConfig::from_spec(name, spec)?;
        self.register_config(config.clone()).await;
        Ok(config)
    }

    /// Register an already-validated config
    pub async fn register_config(&self, config: ServerConfig) {
        self.insert_config(config.clone());
        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save(&config).await {
                warn!(server = %config.name, error = %e, "[ConnectionManager] Failed to persist server config");
            }
        }
    }

    fn insert_config(&self, config: ServerConfig) {
        let name = config.name.clone();
        let transport = config.kind();
        let requires_auth = config.requires_auth;
        let replaced = self.registry.register(config).is_some();
        info!(
            server = %name,
            transport = %transport,
            requires_auth,
            replaced,
            "[ConnectionManager] Server registered"
        );
        self.event_bus.sender().emit(DomainEvent::ServerRegistered {
            server_name: name,
            transport,
            requires_auth,
        });
    }

    /// Remove a config. Rejected while any shared or session connection (or
    /// connect attempt) exists for `name`.
    pub async fn remove(&self, name: &str) -> ManagerResult<ServerConfig> {
        if !self.registry.contains(name) {
            return Err(ManagerError::NotRegistered(name.to_string()));
        }
        if self.pool.is_active(name) || self.sessions.has_server(name) {
            return Err(ManagerError::Conflict(format!(
                "server '{}' has live connections; disconnect first",
                name
            )));
        }

        let removed = self
            .registry
            .remove(name)
            .ok_or_else(|| ManagerError::NotRegistered(name.to_string()))?;

        // A connect that raced the check above must not outlive its config.
        let raced_shared = self.pool.disconnect(name).await;
        let raced_sessions = self.sessions.drop_server(name).await;
        if raced_shared || raced_sessions > 0 {
            warn!(server = %name, "[ConnectionManager] Closed connection opened during removal");
        }
        self.ledger.forget_server(name);

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.delete(name).await {
                warn!(server = %name, error = %e, "[ConnectionManager] Failed to delete persisted server config");
            }
        }
        info!(server = %name, "[ConnectionManager] Server removed");
        self.event_bus.sender().emit(DomainEvent::ServerRemoved {
            server_name: name.to_string(),
        });
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<ServerConfig> {
        self.registry.get(name)
    }

    pub fn list(&self) -> Vec<ServerConfig> {
        self.registry.list()
    }

    // ---- Connection Pool ----

    /// Connect the shared connection for `name`, or join the attempt already
    /// in flight. `timeout` bounds this caller's wait only.
    pub async fn connect(
        &self,
        name: &str,
        token: Option<&str>,
        timeout: Option<Duration>,
    ) -> ManagerResult<Arc<Connection>> {
        let server = self.require(name)?;
        let join = self.pool.connect(&server, token);
        self.wait(join, format!("connect '{}'", name), timeout).await
    }

    /// Close the shared connection. Returns false when nothing was connected.
    pub async fn disconnect(&self, name: &str) -> bool {
        self.pool.disconnect(name).await
    }

    // ---- Session Connection Table ----

    /// The connection `session_id` uses for `name`, opening it if needed
    pub async fn get_user_connection(
        &self,
        session_id: &str,
        name: &str,
        token: Option<&str>,
        timeout: Option<Duration>,
    ) -> ManagerResult<Arc<Connection>> {
        let server = self.require(name)?;
        let join = self.sessions.get_or_create(session_id, &server, token);
        self.wait(join, format!("connect '{}' for session '{}'", name, session_id), timeout)
            .await
    }

    pub async fn drop_user_connection(&self, session_id: &str, name: &str) -> bool {
        self.sessions.drop_connection(session_id, name).await
    }

    /// Close every connection of `session_id`; returns how many were closed
    pub async fn drop_session(&self, session_id: &str) -> usize {
        self.sessions.drop_session(session_id).await
    }

    pub fn session_connections(&self, session_id: &str) -> Vec<String> {
        self.sessions.session_servers(session_id)
    }

    // ---- Tool Router ----

    pub fn list_tools(&self) -> Vec<RoutedTool> {
        self.router.list_all()
    }

    pub async fn call(
        &self,
        name: &str,
        tool_name: &str,
        arguments: Value,
        session_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> ManagerResult<Value> {
        self.router
            .call(name, tool_name, arguments, session_id, timeout)
            .await
    }

    // ---- Status & Error Ledger ----

    /// One row per registered server, in registration order
    pub fn status(&self, session_id: Option<&str>) -> Vec<ServerStatus> {
        self.registry
            .list()
            .into_iter()
            .map(|server| {
                let shared_key = ConnectionKey::shared(&server.name);
                let connected = self.pool.is_connected(&server.name);
                let state = observed_state(
                    self.ledger.state(&shared_key),
                    connected,
                    self.pool.is_stale(&server.name),
                );

                let (user_connected, user_state, last_error) = match session_id {
                    Some(session) if server.requires_auth => {
                        let key = ConnectionKey::session(session, &server.name);
                        let user_connected = self.sessions.is_connected(session, &server.name);
                        let user_state = observed_state(
                            self.ledger.state(&key),
                            user_connected,
                            self.sessions.is_stale(session, &server.name),
                        );
                        (
                            Some(user_connected),
                            Some(user_state),
                            self.ledger.last_error(&key),
                        )
                    }
                    Some(_) => (Some(false), None, self.ledger.last_error(&shared_key)),
                    None => (None, None, self.ledger.last_error(&shared_key)),
                };

                ServerStatus {
                    server_name: server.name,
                    connected,
                    user_connected,
                    state,
                    user_state,
                    last_error,
                }
            })
            .collect()
    }

    pub fn last_error(&self, name: &str, session_id: Option<&str>) -> Option<ErrorRecord> {
        let key = match session_id {
            Some(session) => ConnectionKey::session(session, name),
            None => ConnectionKey::shared(name),
        };
        self.ledger.last_error(&key)
    }

    /// Snapshot of every live connection, shared first
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut shared: Vec<ConnectionInfo> =
            self.pool.connections().iter().map(|c| c.info()).collect();
        shared.sort_by(|a, b| a.server_name.cmp(&b.server_name));

        let mut per_session: Vec<ConnectionInfo> =
            self.sessions.connections().iter().map(|c| c.info()).collect();
        per_session.sort_by(|a, b| {
            (&a.session_id, &a.server_name).cmp(&(&b.session_id, &b.server_name))
        });

        shared.extend(per_session);
        shared
    }

    /// Close every channel, stop the closure loop, and empty all tables
    pub async fn shutdown(&self) {
        info!("[ConnectionManager] Shutting down");
        let sessions = self.sessions.close_all().await;
        let shared = self.pool.close_all().await;

        let task = self.closure_task.lock().take();
        if let Some(ClosureTask { stop, handle }) = task {
            let _ = stop.send(());
            match handle.await {
                Ok(rx) => *self.closed_rx.lock() = Some(rx),
                Err(e) => warn!(error = %e, "[ConnectionManager] Closure loop did not stop cleanly"),
            }
        }
        self.ledger.clear();
        self.event_bus.sender().emit(DomainEvent::ManagerShutdown);
        info!(shared, sessions, "[ConnectionManager] Shutdown complete");
    }

    fn require(&self, name: &str) -> ManagerResult<ServerConfig> {
        self.registry
            .get(name)
            .ok_or_else(|| ManagerError::NotRegistered(name.to_string()))
    }

    async fn wait(
        &self,
        join: Join,
        operation: String,
        timeout: Option<Duration>,
    ) -> ManagerResult<Arc<Connection>> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, join.wait())
                .await
                .map_err(|_| ManagerError::timeout(operation, timeout))?,
            None => join.wait().await,
        }
    }
}

/// A channel that closed before the loop evicted it already counts as failed
fn observed_state(recorded: ConnectionState, connected: bool, stale: bool) -> ConnectionState {
    match recorded {
        ConnectionState::Connected if stale => ConnectionState::Failed,
        ConnectionState::Connected if !connected => ConnectionState::Disconnected,
        state => state,
    }
}

async fn run_closure_loop(
    mut rx: mpsc::UnboundedReceiver<ChannelClosed>,
    mut stop: oneshot::Receiver<()>,
    connector: Arc<Connector>,
    pool: Arc<ConnectionPool>,
    sessions: Arc<SessionConnectionTable>,
) -> mpsc::UnboundedReceiver<ChannelClosed> {
    loop {
        let closed = tokio::select! {
            biased;
            _ = &mut stop => break,
            closed = rx.recv() => closed,
        };
        let Some(ChannelClosed { channel_id, reason }) = closed else {
            break;
        };
        let Some(key) = connector.key_for(channel_id) else {
            debug!(channel_id, "[ConnectionManager] Closure for untracked channel ignored");
            continue;
        };

        let evicted = match &key.session_id {
            Some(session) => sessions.handle_closed(session, &key.server_name, channel_id, &reason),
            None => pool.handle_closed(&key.server_name, channel_id, &reason),
        };

        if !evicted {
            // Closed before it was adopted; the attempt reports its own failure.
            connector.forget_channel(channel_id);
            connector
                .ledger()
                .record_error(&key, format!("connection lost: {}", reason));
            debug!(
                server = %key.server_name,
                session = ?key.session_id,
                channel_id,
                "[ConnectionManager] Closure for a channel not serving its key"
            );
        }
    }
    debug!("[ConnectionManager] Closure loop ended");
    rx
}
