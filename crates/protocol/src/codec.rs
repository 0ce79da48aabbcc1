//! Message serialization and framing
//!
//! Messages are serialized with postcard and framed with a length prefix so
//! a dispatch host can read them off any byte stream (stdin/stdout, a pipe,
//! an in-memory duplex in tests).
//!
//! # Frame Format
//!
//! ```text
//! [Length: u32 (big-endian)][Message bytes (postcard serialized)]
//! ```

use crate::{CURRENT_VERSION, Message, ProtocolVersion, error::ProtocolError, error::Result};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum allowed frame size (32 MiB)
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// Encode a message to bytes using postcard
///
/// # Example
/// ```
/// use protocol::{Message, MessagePayload, CURRENT_VERSION, encode_message};
///
/// let msg = Message {
///     version: CURRENT_VERSION,
///     payload: MessagePayload::GetDevicesRequest,
/// };
/// let bytes = encode_message(&msg).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    postcard::to_allocvec(message).map_err(ProtocolError::from)
}

/// Decode a message from bytes using postcard
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    postcard::from_bytes(bytes).map_err(ProtocolError::from)
}

/// Validate protocol version compatibility
///
/// Major versions must match; minor differences are tolerated in both
/// directions.
pub fn validate_version(message_version: &ProtocolVersion) -> Result<()> {
    if message_version.major != CURRENT_VERSION.major {
        return Err(ProtocolError::IncompatibleVersion {
            major: message_version.major,
            minor: message_version.minor,
            expected_major: CURRENT_VERSION.major,
            expected_minor: CURRENT_VERSION.minor,
        });
    }
    Ok(())
}

/// Encode a message with length prefix for framing
pub fn encode_framed(message: &Message) -> Result<Vec<u8>> {
    let message_bytes = encode_message(message)?;
    let message_len = message_bytes.len();

    check_frame_length(message_len)?;

    let mut frame = Vec::with_capacity(4 + message_len);
    frame.extend_from_slice(&(message_len as u32).to_be_bytes());
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}

fn check_frame_length(length: usize) -> Result<()> {
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// Async: write a framed message and flush it
#[cfg(feature = "async")]
pub async fn write_framed_async<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let framed = encode_framed(message)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Async: read one framed message
///
/// A stream closed before the length prefix surfaces as an I/O error for
/// which [`ProtocolError::is_eof`] is true.
#[cfg(feature = "async")]
pub async fn read_framed_async<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let length = u32::from_be_bytes(len_bytes) as usize;
    check_frame_length(length)?;

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes).await?;

    decode_message(&message_bytes)
}
