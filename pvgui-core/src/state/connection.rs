//! Session lifecycle with validated transitions.
//!
//! Transitions return `Result` instead of panicking; only the loss of
//! the channel is accepted from every state.

use std::time::{Duration, Instant};

use crate::error::GuiError;

// ── SessionState ─────────────────────────────────────────────────

/// ```text
///  AwaitingHandshake ──► AwaitingPeerConfig ──► Running
///          ▲                     │                 │
///          │                     ▼                 ▼
///          └──────────────── Disconnected ◄────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Fresh channel; our protocol version has not been sent yet.
    #[default]
    AwaitingHandshake,

    /// Version sent; waiting for the peer's configuration block.
    AwaitingPeerConfig,

    /// Window created and framebuffer exported; steady state.
    Running {
        /// When the session entered `Running`.
        since: Instant,
    },

    /// The channel is gone. Steady-state data has been dropped.
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            Self::AwaitingPeerConfig => write!(f, "AwaitingPeerConfig"),
            Self::Running { .. } => write!(f, "Running"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the session has been `Running`; `None` otherwise.
    pub fn running_duration(&self) -> Option<Duration> {
        match self {
            Self::Running { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `AwaitingHandshake`.
    pub fn handshake_sent(&mut self) -> Result<(), GuiError> {
        match self {
            Self::AwaitingHandshake => {
                *self = Self::AwaitingPeerConfig;
                Ok(())
            }
            _ => Err(GuiError::ProtocolViolation(
                "handshake already sent on this channel",
            )),
        }
    }

    /// Valid from: `AwaitingPeerConfig`.
    pub fn peer_configured(&mut self) -> Result<(), GuiError> {
        match self {
            Self::AwaitingPeerConfig => {
                *self = Self::Running {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(GuiError::ProtocolViolation(
                "peer configuration outside of handshake",
            )),
        }
    }

    /// The channel closed or was torn down. Valid from any state.
    pub fn channel_lost(&mut self) {
        *self = Self::Disconnected;
    }

    /// A fresh channel replaced the old one.
    ///
    /// Valid from: `Disconnected`.
    pub fn restart(&mut self) -> Result<(), GuiError> {
        match self {
            Self::Disconnected => {
                *self = Self::AwaitingHandshake;
                Ok(())
            }
            _ => Err(GuiError::ProtocolViolation(
                "cannot restart: session not disconnected",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
