//! Domain entities, value objects, and events

mod event;
mod server_config;
mod status;
mod tool;

pub use event::DomainEvent;
pub use server_config::{ServerConfig, ServerSpec, TransportConfig, TransportKind};
pub use status::{ConnectionState, ErrorRecord, ServerStatus};
pub use tool::{RoutedTool, ToolDescriptor};
