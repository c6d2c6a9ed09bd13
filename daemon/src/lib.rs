//! Meeting scheduler daemon
//!
//! Library half of `meetingd`: configuration, the per-connection state
//! machine, command handlers and the connection supervisor. The binary only
//! wires these together.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use connection::{CloseReason, Connection, ConnectionSettings};
pub use handlers::{Command, HandlerContext, dispatch};
pub use server::{Server, open_backend};
