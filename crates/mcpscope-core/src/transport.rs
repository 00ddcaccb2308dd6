//! Transport Adapter port
//!
//! The connection manager never touches processes or sockets. It asks a
//! [`TransportAdapter`] to open a [`Channel`] and talks to the server through
//! that channel only. Adapters report unexpected termination through the
//! [`ClosedNotifier`] they were handed at open time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{ServerConfig, ToolDescriptor};
use crate::error::TransportError;

/// Process-unique channel identity
pub type ChannelId = u64;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh channel id
pub fn next_channel_id() -> ChannelId {
    NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Unsolicited closure of a channel (process exit, socket drop)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelClosed {
    pub channel_id: ChannelId,
    pub reason: String,
}

/// One-shot closure callback handed to an adapter with each `open`.
///
/// The notification fires at most once. Closing a channel on purpose disarms
/// the notifier first so an intentional close is never reported as a failure.
#[derive(Debug, Clone)]
pub struct ClosedNotifier {
    channel_id: ChannelId,
    tx: mpsc::UnboundedSender<ChannelClosed>,
    fired: Arc<AtomicBool>,
}

impl ClosedNotifier {
    pub fn new(channel_id: ChannelId, tx: mpsc::UnboundedSender<ChannelClosed>) -> Self {
        Self {
            channel_id,
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Report that the channel went away on its own
    pub fn notify(&self, reason: impl Into<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let event = ChannelClosed {
            channel_id: self.channel_id,
            reason: reason.into(),
        };
        if self.tx.send(event).is_err() {
            debug!(channel_id = self.channel_id, "closure listener gone");
        }
    }

    /// Suppress any later notification
    pub fn disarm(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        !self.fired.load(Ordering::SeqCst)
    }
}

/// An open, bidirectional message channel to one tool server
#[async_trait]
pub trait Channel: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Fetch the server's full tool catalog
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError>;

    /// Invoke a tool and return the server's result verbatim
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, TransportError>;

    /// Whether the transport has signalled that it is gone
    fn is_closed(&self) -> bool;

    /// Close the channel; idempotent
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens channels to tool servers
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Open a channel for `server`. `token` is only ever supplied for servers
    /// that require auth. The returned channel's id is `notifier.channel_id()`.
    async fn open(
        &self,
        server: &ServerConfig,
        token: Option<&str>,
        notifier: ClosedNotifier,
    ) -> Result<Arc<dyn Channel>, TransportError>;
}
