//! Domain events
//!
//! Every registry change and every lifecycle transition is published as a
//! [`DomainEvent`]. Events are facts: they are emitted after the state change
//! they describe and never mutated.

use serde::{Deserialize, Serialize};

use super::{ConnectionState, TransportKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ServerRegistered {
        server_name: String,
        transport: TransportKind,
        requires_auth: bool,
    },
    ServerRemoved {
        server_name: String,
    },
    ConnectionStateChanged {
        server_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        state: ConnectionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    ToolsDiscovered {
        server_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        tool_count: usize,
    },
    ManagerShutdown,
}

impl DomainEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ServerRegistered { .. } => "server_registered",
            Self::ServerRemoved { .. } => "server_removed",
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::ToolsDiscovered { .. } => "tools_discovered",
            Self::ManagerShutdown => "manager_shutdown",
        }
    }

    pub fn server_name(&self) -> Option<&str> {
        match self {
            Self::ServerRegistered { server_name, .. }
            | Self::ServerRemoved { server_name }
            | Self::ConnectionStateChanged { server_name, .. }
            | Self::ToolsDiscovered { server_name, .. } => Some(server_name),
            Self::ManagerShutdown => None,
        }
    }
}
