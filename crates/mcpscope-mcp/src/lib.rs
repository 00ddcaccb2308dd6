//! # mcpscope MCP transport adapter
//!
//! Implements the [`TransportAdapter`](mcpscope_core::TransportAdapter) port on
//! top of the `rmcp` SDK.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  RmcpTransportAdapter                     │
//! │   ┌──────────────────┐        ┌──────────────────────┐    │
//! │   │  stdio::open     │        │   http::open         │    │
//! │   │  (child process) │        │   (streamable HTTP)  │    │
//! │   └────────┬─────────┘        └──────────┬───────────┘    │
//! │            └──────────► RmcpChannel ◄────┘                │
//! │                 peer + watcher task + notifier            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Each opened channel owns a watcher task that waits on the rmcp service.
//! When the service ends without being asked to, the watcher fires the
//! channel's [`ClosedNotifier`](mcpscope_core::ClosedNotifier).

mod adapter;
mod channel;
mod handler;
mod http;
mod stdio;

pub use adapter::RmcpTransportAdapter;
pub use channel::{McpClient, RmcpChannel};
pub use handler::McpClientHandler;
