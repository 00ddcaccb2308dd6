//! Broadcast distribution of domain events
//!
//! The connection manager publishes registry changes and lifecycle
//! transitions on one bus. Each subscriber gets its own copy of every event
//! emitted after it subscribed; a slow subscriber loses the oldest events
//! rather than holding up the manager.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::DomainEvent;

/// Events buffered per subscriber before the oldest are dropped
const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
            server: None,
        }
    }

    /// Subscribe to the events of one server only
    pub fn subscribe_server(&self, server_name: impl Into<String>) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
            server: Some(server_name.into()),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Emitting half; emission never blocks and never fails
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventSender {
    /// Returns how many subscribers the event reached
    pub fn emit(&self, event: DomainEvent) -> usize {
        let kind = event.type_name();
        let server = event.server_name().map(str::to_string);
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!(event = kind, server = ?server, delivered, "Event emitted");
        delivered
    }
}

pub struct EventReceiver {
    rx: broadcast::Receiver<DomainEvent>,
    server: Option<String>,
}

impl EventReceiver {
    /// Next event, or `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, server = ?self.server, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, server = ?self.server, "Event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Server-scoped receivers still see manager-wide events
    fn accepts(&self, event: &DomainEvent) -> bool {
        match (&self.server, event.server_name()) {
            (Some(wanted), Some(name)) => wanted == name,
            _ => true,
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_shared_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
