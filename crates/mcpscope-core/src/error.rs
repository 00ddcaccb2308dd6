//! Error taxonomy for connection management
//!
//! Both error types are `Clone`: one failed connect attempt is handed to every
//! caller that was attached to it.

use std::time::Duration;

/// Failures reported by a Transport Adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    #[error("request '{method}' failed: {message}")]
    Request { method: String, message: String },

    #[error("channel closed: {0}")]
    Closed(String),

    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    pub fn request(method: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Request {
            method: method.into(),
            message: message.to_string(),
        }
    }
}

/// Errors returned by every Connection Manager operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("invalid server config: {0}")]
    Validation(String),

    #[error("server '{0}' is not registered")]
    NotRegistered(String),

    #[error("{0}")]
    Conflict(String),

    #[error("server '{server}' is not connected{}", session_suffix(.session))]
    NotConnected {
        server: String,
        session: Option<String>,
    },

    #[error("tool '{tool}' not found on server '{server}'")]
    ToolNotFound { server: String, tool: String },

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

fn session_suffix(session: &Option<String>) -> String {
    match session {
        Some(id) => format!(" for session '{}'", id),
        None => String::new(),
    }
}

impl ManagerError {
    pub fn not_connected(server: impl Into<String>, session: Option<&str>) -> Self {
        Self::NotConnected {
            server: server.into(),
            session: session.map(str::to_string),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Stable machine-readable kind, used by the HTTP layer
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotRegistered(_) => "not_registered",
            Self::Conflict(_) => "conflict",
            Self::NotConnected { .. } => "not_connected",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::Timeout { .. } => "timeout",
            Self::Transport(_) => "transport",
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
