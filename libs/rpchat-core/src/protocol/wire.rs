use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::MAX_STR;

/// Read one length-prefixed string starting at `*offset`.
///
/// Returns `Ok(None)` when the buffer does not yet hold the whole string;
/// the caller retries once more bytes arrive. A length field larger than
/// [`MAX_STR`] is fatal and reported before the payload is available.
pub fn read_string(buf: &[u8], offset: &mut usize) -> Result<Option<Vec<u8>>, ProtocolError> {
    if buf.len() < *offset + 2 {
        return Ok(None);
    }
    let len = u16::from_be_bytes([buf[*offset], buf[*offset + 1]]) as usize;
    if len > MAX_STR {
        return Err(ProtocolError::LengthExceeded {
            max: MAX_STR,
            actual: len,
        });
    }
    if buf.len() < *offset + 2 + len {
        return Ok(None);
    }
    let payload = buf[*offset + 2..*offset + 2 + len].to_vec();
    *offset += 2 + len;
    Ok(Some(payload))
}

/// Append one length-prefixed string to the output buffer.
pub fn write_string(payload: &[u8], buf: &mut BytesMut) {
    debug_assert!(payload.len() <= MAX_STR);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
}
