//! Message bodies of the GUI protocol.
//!
//! Every body is a packed sequence of little-endian `u32`/`i32` fields
//! (or a raw byte array). Fixed-size bodies implement [`WireBody`];
//! the only variable-size body is the outbound page list.
//!
//! - `inbound`: daemon → agent bodies (input events, configure, keymap).
//! - `outbound`: agent → daemon bodies (window management, damage, pages).

pub mod inbound;
pub mod outbound;

use bytes::{Buf, BufMut};

use crate::error::GuiError;

pub use inbound::{Button, Configure, KeyBitmap, KeyPress, KeymapNotify, Motion, PeerConfig};
pub use outbound::{CreateWindow, MapInfo, Outbound, PageId, PageList, ShmImage, WindowHints, WmName};

/// A fixed-size wire body.
pub trait WireBody: Sized {
    /// Encoded size on the wire.
    const SIZE: usize;

    /// Append the encoded body to `dst`.
    fn put(&self, dst: &mut impl BufMut);

    /// Read the body from `src`, which holds at least [`Self::SIZE`] bytes.
    fn get(src: &mut impl Buf) -> Self;

    /// Deserialize from bytes.
    fn decode(data: &[u8]) -> Result<Self, GuiError> {
        if data.len() < Self::SIZE {
            return Err(GuiError::InvalidPayload {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut src = &data[..Self::SIZE];
        Ok(Self::get(&mut src))
    }

    /// Serialize to bytes.
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.put(&mut buf);
        buf
    }
}
