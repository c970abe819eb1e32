//! # pvgui-core
//!
//! Protocol core of a paravirtualized GUI agent: the guest side of a
//! display link whose peer shows the guest framebuffer and injects input.
//!
//! This crate contains:
//! - **Transport**: `Channel`/`Connector` seams, exact-size I/O, write
//!   staging and the multiplexed wait
//! - **Protocol types**: `MessageHeader`, `MsgType`, inbound and outbound bodies
//! - **Codec**: `GuiCodec` for `tokio_util` framing
//! - **Dispatcher**: allow-list routing with length-budgeted discards
//! - **Input**: keycode → scancode translation, lock sync, pointer mapping
//! - **Export**: framebuffer page lists and low-depth pixel conversion
//! - **Session**: handshake, window setup, steady state and reconnects
//! - **Error**: `GuiError`, a typed `thiserror` hierarchy

pub mod codec;
pub mod dispatcher;
pub mod display;
pub mod error;
pub mod export;
pub mod flags;
pub mod header;
pub mod input;
pub mod message;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{Frame, GuiCodec};
pub use dispatcher::{Dispatcher, Inbound, Step};
pub use display::{DisplayEvent, GraphicsBackend, PixelFormat, Rect, Surface, SurfaceId};
pub use error::GuiError;
pub use export::{Exporter, PageResolver};
pub use flags::{HintFlags, LedState, ModifierState, PointerButtons};
pub use header::{HEADER_SIZE, MAIN_WINDOW, MessageHeader, PROTOCOL_VERSION};
pub use input::{InputSink, InputTranslator, Keymap};
pub use message::{InboundKind, MsgType};
pub use session::{Session, SessionConfig, WindowGeometry};
pub use state::SessionState;
pub use transport::{Channel, Connector, MemoryChannel, MemoryConnector, MemoryPeer, Transport, Wake};
