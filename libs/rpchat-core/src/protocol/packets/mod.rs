mod deliver;
mod register;
mod send;
mod status;

pub use deliver::Deliver;
pub use register::Register;
pub use send::Send;
pub use status::Status;

use bytes::BytesMut;

use crate::error::ProtocolError;
use crate::protocol::Opcode;

/// One decoded BCP frame.
///
/// String payloads are kept as raw bytes; sanitization happens at the point
/// of use, never on the wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Register(Register),
    Send(Send),
    Deliver(Deliver),
    Status(Status),
}

impl Frame {
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Register(_) => Opcode::Register,
            Frame::Send(_) => Opcode::Send,
            Frame::Deliver(_) => Opcode::Deliver,
            Frame::Status(_) => Opcode::Status,
        }
    }

    /// Try to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(Some((frame, consumed)))` on a complete frame and
    /// `Ok(None)` when more bytes are needed. Unknown opcodes and oversized
    /// length fields are fatal.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let opcode =
            Opcode::from_u8(buf[0]).ok_or(ProtocolError::InvalidOpcode { opcode: buf[0] })?;
        let mut offset = 1;
        let frame = match opcode {
            Opcode::Register => Register::decode(buf, &mut offset)?.map(Frame::Register),
            Opcode::Send => Send::decode(buf, &mut offset)?.map(Frame::Send),
            Opcode::Deliver => Deliver::decode(buf, &mut offset)?.map(Frame::Deliver),
            Opcode::Status => Status::decode(buf, &mut offset)?.map(Frame::Status),
        };
        Ok(frame.map(|frame| (frame, offset)))
    }

    /// Serialize the frame, appending to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Frame::Register(frame) => frame.encode(buf),
            Frame::Send(frame) => frame.encode(buf),
            Frame::Deliver(frame) => frame.encode(buf),
            Frame::Status(frame) => frame.encode(buf),
        }
    }

    /// Exact number of bytes [`Frame::encode`] will append.
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Register(frame) => frame.encoded_len(),
            Frame::Send(frame) => frame.encoded_len(),
            Frame::Deliver(frame) => frame.encoded_len(),
            Frame::Status(frame) => frame.encoded_len(),
        }
    }
}
