//! In-memory collaborators for integration tests
//!
//! `MockTransportAdapter` stands in for the rmcp adapter: every channel it
//! opens is a `MockChannel` that serves a fixed catalog and echoes tool calls.
//! Per-server behaviour (catalog, delays, failures) can be changed while a
//! test runs, and every adapter-level call is counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use mcpscope_core::{
    Channel, ChannelId, ClosedNotifier, RepoResult, ServerConfig, ServerConfigRepository,
    ToolDescriptor, TransportAdapter, TransportError,
};

// ============================================================================
// MockTransportAdapter
// ============================================================================

/// How the mock behaves for one server name
#[derive(Debug, Clone)]
pub struct MockServer {
    pub tools: Vec<ToolDescriptor>,
    pub open_delay: Duration,
    pub call_delay: Duration,
    pub open_error: Option<TransportError>,
    pub list_error: Option<TransportError>,
    pub call_error: Option<TransportError>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self {
            tools: vec![
                ToolDescriptor::new("echo").with_description("Echo the arguments back"),
                ToolDescriptor::new("add").with_description("Add two numbers"),
            ],
            open_delay: Duration::ZERO,
            call_delay: Duration::ZERO,
            open_error: None,
            list_error: None,
            call_error: None,
        }
    }
}

/// One `open` as seen by the adapter
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRecord {
    pub server_name: String,
    pub token: Option<String>,
    pub channel_id: ChannelId,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    list_calls: AtomicUsize,
    tool_calls: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Default)]
pub struct MockTransportAdapter {
    servers: Mutex<HashMap<String, MockServer>>,
    counters: Arc<Counters>,
    opened: Mutex<Vec<OpenRecord>>,
    channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockTransportAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change how `server_name` behaves from the next operation on
    pub fn configure(&self, server_name: &str, update: impl FnOnce(&mut MockServer)) {
        let mut servers = self.servers.lock();
        update(servers.entry(server_name.to_string()).or_default());
    }

    pub fn set_tools(&self, server_name: &str, names: &[&str]) {
        self.configure(server_name, |s| {
            s.tools = names.iter().map(|n| ToolDescriptor::new(*n)).collect();
        });
    }

    pub fn set_open_delay(&self, server_name: &str, delay: Duration) {
        self.configure(server_name, |s| s.open_delay = delay);
    }

    pub fn set_call_delay(&self, server_name: &str, delay: Duration) {
        self.configure(server_name, |s| s.call_delay = delay);
    }

    pub fn fail_open(&self, server_name: &str, error: Option<TransportError>) {
        self.configure(server_name, |s| s.open_error = error);
    }

    pub fn fail_list(&self, server_name: &str, error: Option<TransportError>) {
        self.configure(server_name, |s| s.list_error = error);
    }

    pub fn fail_calls(&self, server_name: &str, error: Option<TransportError>) {
        self.configure(server_name, |s| s.call_error = error);
    }

    fn server(&self, server_name: &str) -> MockServer {
        self.servers
            .lock()
            .get(server_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn open_count_for(&self, server_name: &str) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|r| r.server_name == server_name)
            .count()
    }

    pub fn list_count(&self) -> usize {
        self.counters.list_calls.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.counters.tool_calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Every open that reached the adapter, in order
    pub fn opened(&self) -> Vec<OpenRecord> {
        self.opened.lock().clone()
    }

    /// Tokens handed to the adapter for `server_name`, in open order
    pub fn tokens_for(&self, server_name: &str) -> Vec<Option<String>> {
        self.opened
            .lock()
            .iter()
            .filter(|r| r.server_name == server_name)
            .map(|r| r.token.clone())
            .collect()
    }

    /// Channels that are open right now
    pub fn open_channels(&self) -> usize {
        self.channels
            .lock()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Kill every open channel to `server_name` as if the process exited.
    /// Returns how many channels were killed.
    pub fn kill_server(&self, server_name: &str) -> usize {
        let victims: Vec<Arc<MockChannel>> = self
            .channels
            .lock()
            .iter()
            .filter(|c| c.server_name == server_name && !c.is_closed())
            .cloned()
            .collect();
        for channel in &victims {
            channel.kill("process exited with status 1");
        }
        victims.len()
    }
}

#[async_trait]
impl TransportAdapter for MockTransportAdapter {
    async fn open(
        &self,
        server: &ServerConfig,
        token: Option<&str>,
        notifier: ClosedNotifier,
    ) -> Result<Arc<dyn Channel>, TransportError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().push(OpenRecord {
            server_name: server.name.clone(),
            token: token.map(str::to_string),
            channel_id: notifier.channel_id(),
        });

        let behaviour = self.server(&server.name);
        if !behaviour.open_delay.is_zero() {
            tokio::time::sleep(behaviour.open_delay).await;
        }
        if let Some(error) = behaviour.open_error {
            return Err(error);
        }

        let channel = Arc::new(MockChannel {
            id: notifier.channel_id(),
            server_name: server.name.clone(),
            behaviour,
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
            notifier,
        });
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }
}

// ============================================================================
// MockChannel
// ============================================================================

pub struct MockChannel {
    id: ChannelId,
    server_name: String,
    behaviour: MockServer,
    counters: Arc<Counters>,
    closed: AtomicBool,
    notifier: ClosedNotifier,
}

impl MockChannel {
    fn kill(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        self.notifier.notify(reason);
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        self.counters.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.behaviour.list_error {
            return Err(error.clone());
        }
        Ok(self.behaviour.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, TransportError> {
        self.counters.tool_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(TransportError::Closed("mock channel closed".into()));
        }
        if !self.behaviour.call_delay.is_zero() {
            tokio::time::sleep(self.behaviour.call_delay).await;
        }
        if let Some(error) = &self.behaviour.call_error {
            return Err(error.clone());
        }
        Ok(json!({
            "content": [{ "type": "text", "text": format!("{}:{}", self.server_name, name) }],
            "isError": false,
            "arguments": arguments,
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.notifier.disarm();
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// MockServerConfigRepository
// ============================================================================

#[derive(Default)]
pub struct MockServerConfigRepository {
    configs: Mutex<Vec<ServerConfig>>,
    fail_writes: AtomicBool,
}

impl MockServerConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(self, config: ServerConfig) -> Self {
        self.configs.lock().push(config);
        self
    }

    /// Make `save` and `delete` fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn names(&self) -> Vec<String> {
        self.configs.lock().iter().map(|c| c.name.clone()).collect()
    }

    fn check_writable(&self) -> RepoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("mock repository is read-only");
        }
        Ok(())
    }
}

#[async_trait]
impl ServerConfigRepository for MockServerConfigRepository {
    async fn list(&self) -> RepoResult<Vec<ServerConfig>> {
        Ok(self.configs.lock().clone())
    }

    async fn save(&self, config: &ServerConfig) -> RepoResult<()> {
        self.check_writable()?;
        let mut configs = self.configs.lock();
        match configs.iter_mut().find(|c| c.name == config.name) {
            Some(existing) => *existing = config.clone(),
            None => configs.push(config.clone()),
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> RepoResult<()> {
        self.check_writable()?;
        self.configs.lock().retain(|c| c.name != name);
        Ok(())
    }
}
