//! Configuration persistence port
//!
//! The connection manager keeps the authoritative in-memory copy of every
//! server configuration. A repository supplies the initial set at startup and
//! is told about registrations and removals so it can persist them.

use async_trait::async_trait;

use crate::domain::ServerConfig;

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

#[async_trait]
pub trait ServerConfigRepository: Send + Sync {
    /// All persisted configurations, in registration order
    async fn list(&self) -> RepoResult<Vec<ServerConfig>>;

    /// Insert or replace a configuration
    async fn save(&self, config: &ServerConfig) -> RepoResult<()>;

    /// Forget a configuration
    async fn delete(&self, name: &str) -> RepoResult<()>;
}
