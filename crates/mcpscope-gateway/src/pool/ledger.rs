//! Status & Error Ledger
//!
//! Last-known [`ConnectionState`] and most recent [`ErrorRecord`] per
//! connection key. Only the latest record per key is kept.

use std::collections::HashMap;

use mcpscope_core::{ConnectionState, ErrorRecord};
use parking_lot::RwLock;

use super::connection::ConnectionKey;

#[derive(Debug, Default, Clone)]
struct LedgerEntry {
    state: ConnectionState,
    last_error: Option<ErrorRecord>,
}

#[derive(Debug, Default)]
pub struct StatusLedger {
    entries: RwLock<HashMap<ConnectionKey, LedgerEntry>>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, key: &ConnectionKey, state: ConnectionState) {
        self.entries.write().entry(key.clone()).or_default().state = state;
    }

    pub fn state(&self, key: &ConnectionKey) -> ConnectionState {
        self.entries
            .read()
            .get(key)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    /// Store `message` as the latest error for `key`, replacing any older one
    pub fn record_error(&self, key: &ConnectionKey, message: impl Into<String>) -> ErrorRecord {
        let record = ErrorRecord::new(
            key.server_name.clone(),
            key.session_id.clone(),
            message.into(),
        );
        self.entries.write().entry(key.clone()).or_default().last_error = Some(record.clone());
        record
    }

    /// Transition to `Failed` and store the error in one step
    pub fn record_failure(&self, key: &ConnectionKey, message: impl Into<String>) -> ErrorRecord {
        let record = ErrorRecord::new(
            key.server_name.clone(),
            key.session_id.clone(),
            message.into(),
        );
        let mut entries = self.entries.write();
        let entry = entries.entry(key.clone()).or_default();
        entry.state = ConnectionState::Failed;
        entry.last_error = Some(record.clone());
        record
    }

    pub fn last_error(&self, key: &ConnectionKey) -> Option<ErrorRecord> {
        self.entries
            .read()
            .get(key)
            .and_then(|e| e.last_error.clone())
    }

    /// Drop every entry for a server, shared and per-session
    pub fn forget_server(&self, server_name: &str) {
        self.entries
            .write()
            .retain(|key, _| key.server_name != server_name);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
