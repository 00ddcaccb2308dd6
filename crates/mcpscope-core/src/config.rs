//! Runtime configuration and the servers file
//!
//! The servers file uses the `mcpServers` JSON layout shared by desktop MCP
//! clients:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "py":     { "command": "python", "args": ["-m", "srv"] },
//!     "secure": { "url": "https://host/mcp", "requiresAuth": true }
//!   }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{ServerConfig, ServerSpec};
use crate::error::ManagerError;

/// Upper bound on a single connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default deadline for a tool call when the caller supplies none
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);
/// Upper bound on a graceful channel close
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection manager tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl ManagerConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

/// Parsed `mcpServers` file. Entry order follows the file.
#[derive(Debug, Default, Deserialize)]
pub struct ServersFile {
    #[serde(rename = "mcpServers", default)]
    servers: Map<String, Value>,
}

impl ServersFile {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("servers file is not valid JSON")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read servers file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("in {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Validate every entry. Invalid entries are returned separately so the
    /// caller can report them without losing the good ones.
    pub fn into_configs(self) -> (Vec<ServerConfig>, Vec<(String, ManagerError)>) {
        let mut configs = Vec::with_capacity(self.servers.len());
        let mut rejected = Vec::new();

        for (name, raw) in self.servers {
            let spec = match serde_json::from_value::<ServerSpec>(raw) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(server = %name, error = %e, "Malformed servers file entry");
                    rejected.push((name, ManagerError::Validation(e.to_string())));
                    continue;
                }
            };
            match ServerConfig::from_spec(name.clone(), spec) {
                Ok(config) => configs.push(config),
                Err(e) => {
                    warn!(server = %name, error = %e, "Invalid servers file entry");
                    rejected.push((name, e));
                }
            }
        }

        (configs, rejected)
    }
}
