//! Protocol message types.
//!
//! Uses proper enums with `TryFrom`, no panics on unknown values. The
//! inbound allow-list lives in [`InboundKind::classify`]: anything it
//! does not name is discarded by the dispatcher.

use std::fmt;

use crate::error::GuiError;
use crate::protocol::WireBody;
use crate::protocol::inbound::{Button, Configure, KeyPress, KeymapNotify, Motion};

// ── MsgType ──────────────────────────────────────────────────────

/// Every message type of the GUI protocol, agent- and daemon-bound.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    KeyPress = 124,
    Button = 125,
    Motion = 126,
    Crossing = 127,
    Focus = 128,
    Resize = 129,
    Create = 130,
    Destroy = 131,
    Map = 132,
    Unmap = 133,
    Configure = 134,
    MfnDump = 135,
    ShmImage = 136,
    Close = 137,
    Execute = 138,
    ClipboardReq = 139,
    ClipboardData = 140,
    WmName = 141,
    KeymapNotify = 142,
    Dock = 143,
    WindowHints = 144,
    WindowFlags = 145,
    WindowClass = 146,
    WindowDump = 147,
    Cursor = 148,
}

impl TryFrom<u32> for MsgType {
    type Error = GuiError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            124 => MsgType::KeyPress,
            125 => MsgType::Button,
            126 => MsgType::Motion,
            127 => MsgType::Crossing,
            128 => MsgType::Focus,
            129 => MsgType::Resize,
            130 => MsgType::Create,
            131 => MsgType::Destroy,
            132 => MsgType::Map,
            133 => MsgType::Unmap,
            134 => MsgType::Configure,
            135 => MsgType::MfnDump,
            136 => MsgType::ShmImage,
            137 => MsgType::Close,
            138 => MsgType::Execute,
            139 => MsgType::ClipboardReq,
            140 => MsgType::ClipboardData,
            141 => MsgType::WmName,
            142 => MsgType::KeymapNotify,
            143 => MsgType::Dock,
            144 => MsgType::WindowHints,
            145 => MsgType::WindowFlags,
            146 => MsgType::WindowClass,
            147 => MsgType::WindowDump,
            148 => MsgType::Cursor,
            _ => {
                return Err(GuiError::UnknownVariant {
                    type_name: "MsgType",
                    value,
                });
            }
        })
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── InboundKind ──────────────────────────────────────────────────

/// The inbound message types this agent acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    KeyPress,
    Button,
    Motion,
    KeymapNotify,
    Configure,
}

impl InboundKind {
    /// Map a raw header type onto the allow-list. `None` means discard.
    pub fn classify(raw: u32) -> Option<Self> {
        match MsgType::try_from(raw).ok()? {
            MsgType::KeyPress => Some(Self::KeyPress),
            MsgType::Button => Some(Self::Button),
            MsgType::Motion => Some(Self::Motion),
            MsgType::KeymapNotify => Some(Self::KeymapNotify),
            MsgType::Configure => Some(Self::Configure),
            _ => None,
        }
    }

    /// Exact body size the peer must declare for this type.
    pub const fn body_size(self) -> usize {
        match self {
            Self::KeyPress => KeyPress::SIZE,
            Self::Button => Button::SIZE,
            Self::Motion => Motion::SIZE,
            Self::KeymapNotify => KeymapNotify::SIZE,
            Self::Configure => Configure::SIZE,
        }
    }

    pub const fn msg_type(self) -> MsgType {
        match self {
            Self::KeyPress => MsgType::KeyPress,
            Self::Button => MsgType::Button,
            Self::Motion => MsgType::Motion,
            Self::KeymapNotify => MsgType::KeymapNotify,
            Self::Configure => MsgType::Configure,
        }
    }
}
