//! Framing codec for `tokio_util`.
//!
//! The encoder writes a [`MessageHeader`] whose `untrusted_len` equals the
//! body length, followed by the body. The decoder is the daemon's view of
//! the same stream: it yields raw frames once header and declared body
//! are both buffered. The agent's own inbound path never decodes through
//! here; see [`crate::dispatcher`].

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::GuiError;
use crate::header::{HEADER_SIZE, MAIN_WINDOW, MessageHeader};
use crate::message::MsgType;
use crate::protocol::Outbound;

/// Largest body either side of the codec accepts.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// One header plus its body, as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Frame {
    /// Interpret the frame as an agent → daemon message.
    pub fn outbound(&self) -> Result<Outbound, GuiError> {
        let msg_type = MsgType::try_from(self.header.msg_type)?;
        Outbound::decode(msg_type, &self.body)
    }
}

/// Stateless encoder/decoder for GUI protocol frames.
#[derive(Debug, Clone, Copy)]
pub struct GuiCodec {
    window: u32,
}

impl GuiCodec {
    pub fn new() -> Self {
        Self::for_window(MAIN_WINDOW)
    }

    /// Codec stamping `window` into every header it encodes.
    pub fn for_window(window: u32) -> Self {
        Self { window }
    }
}

impl Default for GuiCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Outbound> for GuiCodec {
    type Error = GuiError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = item.body_len();
        if body_len > MAX_BODY_SIZE {
            return Err(GuiError::Other(format!(
                "{} body of {body_len} bytes exceeds {MAX_BODY_SIZE}",
                item.msg_type()
            )));
        }
        let header = MessageHeader::new(item.msg_type() as u32, self.window, body_len as u32);
        dst.reserve(HEADER_SIZE + body_len);
        dst.extend_from_slice(&header.encode());
        item.put_body(dst);
        Ok(())
    }
}

impl Decoder for GuiCodec {
    type Item = Frame;
    type Error = GuiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let header = MessageHeader::decode(&src[..HEADER_SIZE])?;
        let body_len = header.untrusted_len as usize;
        if body_len > MAX_BODY_SIZE {
            return Err(GuiError::Other(format!(
                "declared body of {body_len} bytes exceeds {MAX_BODY_SIZE}"
            )));
        }
        if src.len() < HEADER_SIZE + body_len {
            src.reserve(HEADER_SIZE + body_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(HEADER_SIZE + body_len);
        let body = frame.split_off(HEADER_SIZE).freeze();
        Ok(Some(Frame { header, body }))
    }
}
