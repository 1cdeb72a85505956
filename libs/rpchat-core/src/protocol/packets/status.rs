use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::wire::{read_string, write_string};
use crate::protocol::{Opcode, STATUS_ERROR, STATUS_GOOD};

/// STATUS (either direction): acknowledgment of the previous frame.
///
/// Code 0 accepts; any other code rejects, after which the server closes
/// the connection.
///
/// ```text
/// byte 0    opcode (0x04)
/// byte 1    code (0 = OK)
/// bytes 2-3 message length (u16, big-endian)
/// bytes 4.. message
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u8,
    pub message: Vec<u8>,
}

impl Status {
    /// Positive acknowledgment with an empty message.
    pub fn ok() -> Self {
        Status {
            code: STATUS_GOOD,
            message: Vec::new(),
        }
    }

    /// Error status carrying the human-readable reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Status {
            code: STATUS_ERROR,
            message: reason.into().into_bytes(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == STATUS_GOOD
    }

    pub(crate) fn decode(buf: &[u8], offset: &mut usize) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < *offset + 1 {
            return Ok(None);
        }
        let code = buf[*offset];
        *offset += 1;
        let Some(message) = read_string(buf, offset)? else {
            return Ok(None);
        };
        Ok(Some(Status { code, message }))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::Status as u8);
        buf.put_u8(self.code);
        write_string(&self.message, buf);
    }

    pub(crate) fn encoded_len(&self) -> usize {
        1 + 1 + 2 + self.message.len()
    }
}
