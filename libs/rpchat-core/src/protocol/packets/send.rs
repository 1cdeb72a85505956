use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::wire::{read_string, write_string};
use crate::protocol::Opcode;

/// SEND (client to server): broadcast this message to every other client.
///
/// ```text
/// byte 0    opcode (0x02)
/// bytes 1-2 message length (u16, big-endian)
/// bytes 3.. message
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Send {
    pub message: Vec<u8>,
}

impl Send {
    pub(crate) fn decode(buf: &[u8], offset: &mut usize) -> Result<Option<Self>, ProtocolError> {
        let Some(message) = read_string(buf, offset)? else {
            return Ok(None);
        };
        Ok(Some(Send { message }))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::Send as u8);
        write_string(&self.message, buf);
    }

    pub(crate) fn encoded_len(&self) -> usize {
        1 + 2 + self.message.len()
    }
}
