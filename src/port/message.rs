//! Typed message envelope and its datagram encoding.
//!
//! One message is one datagram:
//!
//! ```text
//! +----------------+---------------------------+
//! | msg_type (i32) | content (0..=4096 bytes)  |
//! | little-endian  |                           |
//! +----------------+---------------------------+
//! ```

use crate::codec::{Encoding, Payload};
use crate::error::{Error, Result};
use rustix::io::Errno;

/// Maximum content length of a single message, in bytes.
pub const MAX_CONTENT_LEN: usize = 4096;

/// Size of the `msg_type` header on the wire.
pub const MESSAGE_HEADER_LEN: usize = std::mem::size_of::<i32>();

/// Largest datagram a port sends or accepts.
pub const MAX_MESSAGE_LEN: usize = MESSAGE_HEADER_LEN + MAX_CONTENT_LEN;

/// A typed message: a small integer discriminator plus bounded content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    msg_type: i32,
    content: Vec<u8>,
}

impl Message {
    /// Build a message.
    ///
    /// # Errors
    ///
    /// `ContentTooLarge` if `content` exceeds [`MAX_CONTENT_LEN`]. Content is
    /// never truncated.
    pub fn new(msg_type: i32, content: impl Into<Vec<u8>>) -> Result<Self> {
        let content = content.into();
        check_content_len(content.len())?;
        Ok(Self { msg_type, content })
    }

    /// Build a message from a coerced payload.
    pub fn from_payload(msg_type: i32, payload: Payload<'_>) -> Result<Self> {
        check_content_len(payload.encoded_len())?;
        Ok(Self {
            msg_type,
            content: payload.to_bytes().into_owned(),
        })
    }

    /// Type discriminator.
    pub fn msg_type(&self) -> i32 {
        self.msg_type
    }

    /// Raw content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Take the content bytes.
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// Content decoded as text, trailing NUL fill removed.
    pub fn text(&self, encoding: Encoding) -> String {
        encoding.decode(&self.content)
    }

    /// Append the wire form of `(msg_type, content)` to `out`.
    pub(crate) fn encode_into(msg_type: i32, content: &[u8], out: &mut Vec<u8>) {
        out.reserve(MESSAGE_HEADER_LEN + content.len());
        out.extend_from_slice(&msg_type.to_le_bytes());
        out.extend_from_slice(content);
    }

    /// Parse one received datagram.
    ///
    /// `datagram` may be one byte longer than [`MAX_MESSAGE_LEN`]; that byte
    /// only exists to detect oversized senders.
    pub(crate) fn decode(datagram: &[u8]) -> Result<Self> {
        if datagram.len() > MAX_MESSAGE_LEN {
            return Err(Error::BufferTooSmall {
                max: MAX_MESSAGE_LEN,
            });
        }
        let Some((header, content)) = datagram.split_first_chunk::<MESSAGE_HEADER_LEN>() else {
            return Err(Error::ReceiveFailed {
                errno: Errno::BADMSG,
            });
        };
        Ok(Self {
            msg_type: i32::from_le_bytes(*header),
            content: content.to_vec(),
        })
    }
}

pub(crate) fn check_content_len(size: usize) -> Result<()> {
    if size > MAX_CONTENT_LEN {
        return Err(Error::ContentTooLarge {
            size,
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(())
}
