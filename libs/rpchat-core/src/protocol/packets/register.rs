use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::wire::{read_string, write_string};
use crate::protocol::Opcode;

/// REGISTER (client to server, exactly once per connection).
///
/// ```text
/// byte 0    opcode (0x01)
/// bytes 1-2 username length (u16, big-endian)
/// bytes 3.. username
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub username: Vec<u8>,
}

impl Register {
    pub(crate) fn decode(buf: &[u8], offset: &mut usize) -> Result<Option<Self>, ProtocolError> {
        let Some(username) = read_string(buf, offset)? else {
            return Ok(None);
        };
        Ok(Some(Register { username }))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::Register as u8);
        write_string(&self.username, buf);
    }

    pub(crate) fn encoded_len(&self) -> usize {
        1 + 2 + self.username.len()
    }
}
