//! Buffered frame I/O over a TCP stream.

use bytes::{Buf, Bytes, BytesMut};
use rpchat_core::protocol::Frame;
use rpchat_core::ProtocolError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Why a frame could not be read.
#[derive(Debug)]
pub enum FrameReadError {
    Io(std::io::Error),
    Protocol(ProtocolError),
    /// Peer closed the connection in the middle of a frame
    UnexpectedEof { buffered: usize },
}

impl core::fmt::Display for FrameReadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameReadError::Io(error) => write!(f, "Read failed: {}", error),
            FrameReadError::Protocol(error) => write!(f, "Protocol error: {}", error),
            FrameReadError::UnexpectedEof { buffered } => {
                write!(f, "Connection closed mid-frame ({} bytes buffered)", buffered)
            }
        }
    }
}

impl std::error::Error for FrameReadError {}

impl From<std::io::Error> for FrameReadError {
    fn from(error: std::io::Error) -> Self {
        FrameReadError::Io(error)
    }
}

impl From<ProtocolError> for FrameReadError {
    fn from(error: ProtocolError) -> Self {
        FrameReadError::Protocol(error)
    }
}

/// Read one complete frame, accumulating partial data in `buffer`.
///
/// Clients are not required to present a whole frame per read: short
/// reads park the bytes in the buffer and wait for more. `Ok(None)` means
/// the peer closed cleanly on a frame boundary. Excess bytes stay in the
/// buffer for the next call.
pub async fn read_frame(
    socket: &mut TcpStream,
    buffer: &mut BytesMut,
) -> Result<Option<Frame>, FrameReadError> {
    loop {
        if let Some((frame, consumed)) = Frame::decode(&buffer[..])? {
            buffer.advance(consumed);
            return Ok(Some(frame));
        }
        buffer.reserve(512);
        let n = socket.read_buf(buffer).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(FrameReadError::UnexpectedEof {
                buffered: buffer.len(),
            });
        }
    }
}

/// Encode a frame into owned bytes for transmission.
pub fn encode_frame(frame: &Frame) -> Bytes {
    let mut buffer = BytesMut::with_capacity(frame.encoded_len());
    frame.encode(&mut buffer);
    buffer.freeze()
}

/// Write one frame and flush it.
pub async fn write_frame(socket: &mut TcpStream, frame: &Frame) -> Result<(), std::io::Error> {
    let bytes = encode_frame(frame);
    socket.write_all(&bytes).await?;
    socket.flush().await
}
