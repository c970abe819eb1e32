//! Frame header shared by every message on the channel.
//!
//! ```text
//! type:           u32  (4)
//! window:         u32  (4)
//! untrusted_len:  u32  (4)
//! ```
//!
//! All fields are little-endian. `untrusted_len` comes from the peer and
//! is only ever used as an exact byte count to read or discard.

use bytes::{Buf, BufMut};

use crate::error::GuiError;

/// Encoded size of a [`MessageHeader`] on the wire.
pub const HEADER_SIZE: usize = 12;

/// The handshake value written before anything else on a fresh channel.
pub const PROTOCOL_VERSION: u32 = 1 << 16;

/// Id of the single top-level window this agent manages.
pub const MAIN_WINDOW: u32 = 1;

/// Header preceding every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub msg_type: u32,
    pub window: u32,
    pub untrusted_len: u32,
}

impl MessageHeader {
    pub fn new(msg_type: u32, window: u32, untrusted_len: u32) -> Self {
        Self {
            msg_type,
            window,
            untrusted_len,
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut dst = &mut buf[..];
        dst.put_u32_le(self.msg_type);
        dst.put_u32_le(self.window);
        dst.put_u32_le(self.untrusted_len);
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, GuiError> {
        if data.len() < HEADER_SIZE {
            return Err(GuiError::InvalidPayload {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }
        let mut src = &data[..HEADER_SIZE];
        Ok(Self {
            msg_type: src.get_u32_le(),
            window: src.get_u32_le(),
            untrusted_len: src.get_u32_le(),
        })
    }
}
