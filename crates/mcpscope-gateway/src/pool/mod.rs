//! Connection management
//!
//! - **ConfigRegistry**: validated server configs in registration order
//! - **ConnectionPool**: shared connections, one per server name
//! - **SessionConnectionTable**: per-session connections for auth-required servers
//! - **ToolRouter**: catalog aggregation and call dispatch
//! - **StatusLedger**: last state and last error per connection key
//! - **ConnectionManager**: the facade callers use
//!
//! The pool and the session table share one coalescing [`ConnectionTable`]
//! implementation and one [`Connector`].

mod connection;
mod connector;
mod ledger;
mod lifecycle;
mod manager;
mod registry;
mod routing;
mod session;
mod shared;

pub use connection::{Connection, ConnectionInfo, ConnectionKey, ConnectionStats};
pub use connector::Connector;
pub use ledger::StatusLedger;
pub use lifecycle::{Attempt, ConnectionTable, Join};
pub use manager::ConnectionManager;
pub use registry::ConfigRegistry;
pub use routing::ToolRouter;
pub use session::{SessionConnectionTable, SessionKey};
pub use shared::ConnectionPool;
