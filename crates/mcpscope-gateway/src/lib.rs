//! # mcpscope gateway
//!
//! The Connection Manager and the HTTP server in front of it.
//!
//! - `pool` - registry, coalescing connection tables, tool routing, status ledger
//! - `server` - axum routes over [`ConnectionManager`]

pub mod pool;
pub mod server;

pub use pool::{Connection, ConnectionInfo, ConnectionKey, ConnectionManager};
pub use server::{GatewayConfig, GatewayServer};
