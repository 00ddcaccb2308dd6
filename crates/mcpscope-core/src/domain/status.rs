//! Connection state, error records, and status reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one connection key.
///
/// `Unconnected -> Connecting -> Connected -> (Disconnected | Failed)`, and
/// `Disconnected`/`Failed` go back to `Connecting` on the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Unconnected,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether a connect attempt may start from this state
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Unconnected | Self::Disconnected | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recent failure for one (server, session?) key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub server_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(
        server_name: impl Into<String>,
        session_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            session_id,
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// One row of a status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub server_name: String,
    /// Whether the shared connection is live
    pub connected: bool,
    /// Whether the requesting session holds its own live connection.
    /// Absent when the report was not made for a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_connected: Option<bool>,
    pub state: ConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_state: Option<ConnectionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorRecord>,
}
