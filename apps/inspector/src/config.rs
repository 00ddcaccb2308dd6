//! Runtime settings read from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use mcpscope_core::ManagerConfig;
use mcpscope_gateway::GatewayConfig;

pub const APP_NAME: &str = "mcpscope";

#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub gateway: GatewayConfig,
    pub manager: ManagerConfig,
    /// `mcpServers` file to register at startup
    pub servers_file: Option<PathBuf>,
}

impl InspectorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unset keys keep their defaults;
    /// set-but-invalid keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut gateway = GatewayConfig::default();
        let mut manager = ManagerConfig::default();

        if let Some(host) = lookup("MCPSCOPE_HOST").filter(|h| !h.trim().is_empty()) {
            gateway.host = host.trim().to_string();
        }
        if let Some(port) = parse_var::<u16>(&lookup, "MCPSCOPE_PORT")? {
            gateway.port = port;
        }
        if let Some(enabled) = parse_var::<bool>(&lookup, "MCPSCOPE_CORS")? {
            gateway.enable_cors = enabled;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "MCPSCOPE_CONNECT_TIMEOUT_SECS")? {
            manager = manager.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "MCPSCOPE_CALL_TIMEOUT_SECS")? {
            manager = manager.with_call_timeout(Duration::from_secs(secs));
        }

        let servers_file = match lookup("MCPSCOPE_SERVERS_FILE") {
            Some(path) if !path.trim().is_empty() => Some(PathBuf::from(path.trim())),
            _ => default_servers_file().filter(|p| p.exists()),
        };

        Ok(Self {
            gateway,
            manager,
            servers_file,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {}='{}': {}", key, raw, e)),
    }
}

/// `<config dir>/mcpscope/servers.json`
pub fn default_servers_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("servers.json"))
}

/// `<local data dir>/mcpscope/logs`
pub fn logs_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("logs")
}
