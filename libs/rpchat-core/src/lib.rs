//! # rpchat-core
//!
//! Protocol and room logic for the Basic Chat Protocol (BCP), free of any
//! I/O. The crate owns:
//!
//! - the BCP frame codec (length-prefixed strings, four frame kinds),
//! - byte-level sanitization of usernames and message bodies,
//! - the per-connection session state machine, and
//! - the [`Room`](room::Room): registration, broadcast fan-out, the
//!   DELIVER/STATUS interlock, inactivity expiry, and teardown notices.
//!
//! A runtime layer (see `rpchat-tokio`) supplies sockets, tasks, and time;
//! this crate only consumes frames and produces frames to send.

pub mod error;
pub mod protocol;
pub mod room;
pub mod sanitize;
pub mod session;

pub use error::{ProtocolError, RoomError};
pub use protocol::{Frame, Opcode, MAX_STR};
pub use room::{Room, SERVER_IDENTITY};
pub use session::{Session, SessionState};

/// Process-local identifier for one client connection.
pub type SessionId = u64;
