//! Domain-specific error types for the paravirtualized GUI agent.
//!
//! All fallible operations return `Result<T, GuiError>`. The session
//! layer uses [`GuiError::is_disconnect`] and [`GuiError::is_recoverable`]
//! to decide between tearing the link down, logging and carrying on, or
//! giving up entirely.

use thiserror::Error;

/// The canonical error type for the agent core.
#[derive(Debug, Error)]
pub enum GuiError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u32 },

    /// An allow-listed message declared a length other than its fixed size.
    #[error("message type {msg_type} declared {declared} bytes, expected {expected}")]
    LengthMismatch {
        msg_type: u32,
        declared: u32,
        expected: usize,
    },

    /// A body buffer was too short to decode.
    #[error("invalid payload: expected {expected} bytes, got {actual}")]
    InvalidPayload { expected: usize, actual: usize },

    /// A message or transition violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Transport Errors ─────────────────────────────────────────
    /// The peer went away. Fatal to the session, not to the process.
    #[error("channel closed")]
    ChannelClosed,

    /// The channel returned fewer bytes than requested while still open.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// The underlying channel reported an I/O error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    // ── Input Errors ─────────────────────────────────────────────
    /// The keycode has no scancode in the active keymap.
    #[error("no scancode for keycode {0}")]
    UnmappedKeycode(u8),

    // ── Export Errors ────────────────────────────────────────────
    /// A buffer needed for export or pixel conversion could not be allocated.
    #[error("cannot allocate {what}: {bytes} bytes")]
    Allocation { what: &'static str, bytes: usize },

    /// The surface layout cannot back an export: unknown depth, or rows
    /// and storage smaller than the dimensions claim.
    #[error("cannot export surface: {0}")]
    UnsupportedSurface(String),

    /// The privileged page lookup failed.
    #[error("cannot resolve page at {addr:#x}: {reason}")]
    PageResolve { addr: usize, reason: String },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl GuiError {
    /// Errors that end the current session. The session reconnects on a
    /// fresh channel instead of exiting.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            GuiError::ChannelClosed
                | GuiError::LengthMismatch { .. }
                | GuiError::ProtocolViolation(_)
        )
    }

    /// Errors that only abandon the current operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GuiError::UnmappedKeycode(_)
                | GuiError::Allocation { .. }
                | GuiError::UnsupportedSurface(_)
                | GuiError::PageResolve { .. }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for GuiError {
    fn from(s: String) -> Self {
        GuiError::Other(s)
    }
}

impl From<&str> for GuiError {
    fn from(s: &str) -> Self {
        GuiError::Other(s.to_string())
    }
}
