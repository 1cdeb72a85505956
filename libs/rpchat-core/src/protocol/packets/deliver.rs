use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::wire::{read_string, write_string};
use crate::protocol::Opcode;

/// DELIVER (server to client): a relayed chat message or system notice.
///
/// ```text
/// byte 0    opcode (0x03)
/// bytes 1-2 sender length (u16, big-endian)
/// bytes ..  sender
/// bytes ..  message length (u16, big-endian)
/// bytes ..  message
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deliver {
    pub from: Vec<u8>,
    pub message: Vec<u8>,
}

impl Deliver {
    /// Build a DELIVER from already-sanitized text.
    pub fn new(from: &str, message: &str) -> Self {
        Deliver {
            from: from.as_bytes().to_vec(),
            message: message.as_bytes().to_vec(),
        }
    }

    pub(crate) fn decode(buf: &[u8], offset: &mut usize) -> Result<Option<Self>, ProtocolError> {
        let Some(from) = read_string(buf, offset)? else {
            return Ok(None);
        };
        let Some(message) = read_string(buf, offset)? else {
            return Ok(None);
        };
        Ok(Some(Deliver { from, message }))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::Deliver as u8);
        write_string(&self.from, buf);
        write_string(&self.message, buf);
    }

    pub(crate) fn encoded_len(&self) -> usize {
        1 + 2 + self.from.len() + 2 + self.message.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;

    #[test]
    fn test_deliver_encode() {
        let frame = Frame::Deliver(Deliver::new("bob", "hello"));
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[3, 0, 3, b'b', b'o', b'b', 0, 5, b'h', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn test_deliver_decode_needs_both_strings() {
        // complete sender, truncated message
        let buf = [3, 0, 3, b'b', b'o', b'b', 0, 5, b'h'];
        assert_eq!(Frame::decode(&buf).unwrap(), None);
    }
}
