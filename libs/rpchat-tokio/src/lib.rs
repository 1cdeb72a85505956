//! # rpchat-tokio
//!
//! Tokio runtime for the Basic Chat Protocol server, built on
//! `rpchat-core` for protocol and room logic.
//!
//! The server runs one accept loop, one inactivity-audit task, and one
//! task per client connection. Each connection task owns its socket and
//! receive buffer; cross-connection state lives in a shared
//! [`Room`](rpchat_core::Room) behind a mutex, and handlers wake each
//! other through per-session notification channels when a broadcast
//! queues frames for someone else.
//!
//! ## Example
//!
//! ```no_run
//! use rpchat_tokio::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ChatServer::new(ServerConfig::default());
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod io;
pub mod server;
pub mod state;

pub use server::{ChatServer, ServerConfig, SharedRoom};
pub use state::ServerState;
