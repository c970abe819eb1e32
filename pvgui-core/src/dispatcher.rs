//! Steady-state inbound dispatcher.
//!
//! One frame is in flight at a time:
//!
//! ```text
//!  NoHeader ──► HeaderRead ──► PayloadReady ──► NoHeader
//!                   │
//!                   └────────► Discarding ────► NoHeader
//! ```
//!
//! [`Dispatcher::step`] never blocks and never reads past the declared
//! length. Types outside the allow-list are skipped using the declared
//! length as the discard budget; allow-listed types must declare exactly
//! their fixed body size.

use tracing::{debug, trace, warn};

use crate::error::GuiError;
use crate::header::{HEADER_SIZE, MessageHeader};
use crate::message::{InboundKind, MsgType};
use crate::protocol::WireBody;
use crate::protocol::inbound::{Button, Configure, KeyPress, KeymapNotify, Motion};
use crate::transport::Transport;

/// Scratch size; bounds discard chunks and holds any allow-listed body.
const DISCARD_CHUNK: usize = 256;

// ── Inbound ──────────────────────────────────────────────────────

/// A fully received, allow-listed daemon → agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    KeyPress(KeyPress),
    Button(Button),
    Motion(Motion),
    KeymapNotify(KeymapNotify),
    Configure(Configure),
}

impl Inbound {
    fn decode(kind: InboundKind, body: &[u8]) -> Result<Self, GuiError> {
        Ok(match kind {
            InboundKind::KeyPress => Self::KeyPress(KeyPress::decode(body)?),
            InboundKind::Button => Self::Button(Button::decode(body)?),
            InboundKind::Motion => Self::Motion(Motion::decode(body)?),
            InboundKind::KeymapNotify => Self::KeymapNotify(KeymapNotify::decode(body)?),
            InboundKind::Configure => Self::Configure(Configure::decode(body)?),
        })
    }
}

/// Outcome of one [`Dispatcher::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Not enough data yet; call again on the next wake-up.
    Pending,
    /// A frame outside the allow-list was skipped in full.
    Discarded { msg_type: u32, len: u32 },
    /// A frame was decoded and is ready for its handler.
    Message(Inbound),
}

// ── PendingFrame ─────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PendingFrame {
    header: Option<MessageHeader>,
    /// Bytes still to skip; `None` when no discard is in progress.
    discard: Option<u32>,
}

// ── Dispatcher ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct Dispatcher {
    pending: PendingFrame,
    scratch: [u8; DISCARD_CHUNK],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            pending: PendingFrame::default(),
            scratch: [0; DISCARD_CHUNK],
        }
    }

    /// `true` between frames.
    pub fn is_idle(&self) -> bool {
        self.pending.header.is_none()
    }

    /// Forget any partially consumed frame.
    pub fn reset(&mut self) {
        self.pending = PendingFrame::default();
    }

    /// Advance the in-flight frame as far as the available data allows.
    ///
    /// A length mismatch on an allow-listed type is returned as
    /// [`GuiError::LengthMismatch`] with the frame state cleared; the
    /// caller is expected to drop the connection.
    pub fn step(&mut self, transport: &mut Transport) -> Result<Step, GuiError> {
        let header = match self.pending.header {
            Some(header) => header,
            None => match self.read_header(transport)? {
                Some(header) => header,
                None => return Ok(Step::Pending),
            },
        };

        if let Some(remaining) = self.pending.discard {
            return self.discard(transport, header, remaining);
        }

        // Header accepted and allow-listed; wait for the whole body.
        let Some(kind) = InboundKind::classify(header.msg_type) else {
            return Err(GuiError::ProtocolViolation(
                "pending frame lost its classification",
            ));
        };
        let size = kind.body_size();
        if transport.data_ready() < size {
            return Ok(Step::Pending);
        }

        transport.read_exact(&mut self.scratch[..size])?;
        self.reset();
        let msg = Inbound::decode(kind, &self.scratch[..size])?;
        trace!(?msg, "dispatch");
        Ok(Step::Message(msg))
    }

    /// Read and classify a header if a whole one is available.
    fn read_header(&mut self, transport: &mut Transport) -> Result<Option<MessageHeader>, GuiError> {
        if transport.data_ready() < HEADER_SIZE {
            return Ok(None);
        }
        let mut raw = [0u8; HEADER_SIZE];
        transport.read_exact(&mut raw)?;
        let header = MessageHeader::decode(&raw)?;

        match InboundKind::classify(header.msg_type) {
            Some(kind) if header.untrusted_len as usize != kind.body_size() => {
                warn!(
                    msg_type = %kind.msg_type(),
                    declared = header.untrusted_len,
                    expected = kind.body_size(),
                    "declared length does not match message type"
                );
                return Err(GuiError::LengthMismatch {
                    msg_type: header.msg_type,
                    declared: header.untrusted_len,
                    expected: kind.body_size(),
                });
            }
            Some(_) => {}
            None => {
                match MsgType::try_from(header.msg_type) {
                    Ok(named) => debug!(msg_type = %named, len = header.untrusted_len, "discarding"),
                    Err(_) => debug!(
                        msg_type = header.msg_type,
                        len = header.untrusted_len,
                        "discarding unknown message type"
                    ),
                }
                self.pending.discard = Some(header.untrusted_len);
            }
        }
        self.pending.header = Some(header);
        Ok(Some(header))
    }

    fn discard(
        &mut self,
        transport: &mut Transport,
        header: MessageHeader,
        mut remaining: u32,
    ) -> Result<Step, GuiError> {
        while remaining > 0 {
            let chunk = (remaining as usize).min(DISCARD_CHUNK);
            let n = transport.read_available(&mut self.scratch[..chunk])?;
            if n == 0 {
                self.pending.discard = Some(remaining);
                return Ok(Step::Pending);
            }
            remaining -= n as u32;
        }
        self.reset();
        Ok(Step::Discarded {
            msg_type: header.msg_type,
            len: header.untrusted_len,
        })
    }
}
