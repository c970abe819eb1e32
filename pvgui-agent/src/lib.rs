//! # pvgui-agent: guest-side GUI agent
//!
//! Wires the protocol core to concrete collaborators:
//!
//! - **Config**: TOML file with `[channel]`, `[display]`, `[input]` and
//!   `[logging]` sections.
//! - **Unix channel**: a socket stand-in for the inter-domain ring, served
//!   at `<socket_dir>/pvgui-<domain>-<port>.sock`.
//! - **Pagemap**: framebuffer page resolution via `/proc/self/pagemap`.
//! - **Headless**: a private framebuffer and a tracing input sink, for
//!   running the agent without an emulator.

pub mod config;
pub mod headless;
pub mod pagemap;
pub mod unix;
