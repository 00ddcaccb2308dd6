//! # mcpscope core
//!
//! Domain types and collaborator ports shared by every mcpscope crate.
//!
//! ## Modules
//!
//! - `domain` - Server configurations, tool descriptors, connection state, domain events
//! - `error` - The connection-manager error taxonomy
//! - `event_bus` - Broadcast distribution of domain events
//! - `transport` - The Transport Adapter port implemented by `mcpscope-mcp`
//! - `repository` - Configuration persistence port
//! - `config` - Runtime configuration and the `mcpServers` servers file

pub mod config;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod repository;
pub mod transport;

pub use config::{ManagerConfig, ServersFile};
pub use domain::*;
pub use error::{ManagerError, ManagerResult, TransportError};
pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
pub use repository::{RepoResult, ServerConfigRepository};
pub use transport::{
    next_channel_id, Channel, ChannelClosed, ChannelId, ClosedNotifier, TransportAdapter,
};
