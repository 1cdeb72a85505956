use crate::protocol::Opcode;
use crate::session::SessionState;
use crate::SessionId;

/// Errors raised while decoding or encoding BCP frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// First byte of a frame is not a known opcode
    InvalidOpcode { opcode: u8 },
    /// A string length field exceeds the maximum allowed length
    LengthExceeded { max: usize, actual: usize },
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::InvalidOpcode { opcode } => {
                write!(f, "Invalid opcode: {}", opcode)
            }
            ProtocolError::LengthExceeded { max, actual } => {
                write!(f, "String length exceeded: length {}, max {}", actual, max)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors raised by room operations.
///
/// Every variant maps to a human-readable reason; when a frame handler
/// fails, the reason is seeded into the session's status message and later
/// carried by the best-effort `STATUS(1)` farewell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// No session with this id is attached
    UnknownSession { id: SessionId },
    /// The room already holds the maximum number of sessions
    AtCapacity { max: usize },
    /// Username sanitized down to nothing
    EmptyUsername,
    /// Another session already registered this exact username
    DuplicateUsername { username: String },
    /// Frame kind not permitted in the session's current state
    UnexpectedFrame { opcode: Opcode, state: SessionState },
    /// Client answered a DELIVER with a non-zero status code
    DeliveryRejected { code: u8 },
}

impl core::fmt::Display for RoomError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RoomError::UnknownSession { id } => {
                write!(f, "Session {} not found", id)
            }
            RoomError::AtCapacity { max } => {
                write!(f, "Maximum clients reached: {}", max)
            }
            RoomError::EmptyUsername => {
                write!(f, "Username contains no permitted characters")
            }
            RoomError::DuplicateUsername { username } => {
                write!(f, "Username {} is already taken", username)
            }
            RoomError::UnexpectedFrame { opcode, state } => {
                write!(f, "Unexpected {} frame in {:?} state", opcode, state)
            }
            RoomError::DeliveryRejected { code } => {
                write!(f, "Delivery rejected with status code {}", code)
            }
        }
    }
}

impl std::error::Error for RoomError {}
