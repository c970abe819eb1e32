//! Daemon → agent bodies.
//!
//! Field values are untrusted; only the body sizes are fixed.

use bytes::{Buf, BufMut};

use crate::flags::ModifierState;
use crate::protocol::WireBody;

/// X11 `KeyPress` event type; anything else is a release.
pub const KEY_PRESS: u32 = 2;
/// X11 `ButtonPress` event type; anything else is a release.
pub const BUTTON_PRESS: u32 = 4;

// ── KeyPress ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub ty: u32,
    pub x: i32,
    pub y: i32,
    pub state: u32,
    pub keycode: u32,
}

impl KeyPress {
    pub fn is_release(&self) -> bool {
        self.ty != KEY_PRESS
    }

    pub fn modifiers(&self) -> ModifierState {
        ModifierState::from_bits_truncate(self.state)
    }
}

impl WireBody for KeyPress {
    const SIZE: usize = 20;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.ty);
        dst.put_i32_le(self.x);
        dst.put_i32_le(self.y);
        dst.put_u32_le(self.state);
        dst.put_u32_le(self.keycode);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            ty: src.get_u32_le(),
            x: src.get_i32_le(),
            y: src.get_i32_le(),
            state: src.get_u32_le(),
            keycode: src.get_u32_le(),
        }
    }
}

// ── Button ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Button {
    pub ty: u32,
    pub x: i32,
    pub y: i32,
    pub state: u32,
    pub button: u32,
}

impl Button {
    pub fn is_press(&self) -> bool {
        self.ty == BUTTON_PRESS
    }

    pub fn modifiers(&self) -> ModifierState {
        ModifierState::from_bits_truncate(self.state)
    }
}

impl WireBody for Button {
    const SIZE: usize = 20;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.ty);
        dst.put_i32_le(self.x);
        dst.put_i32_le(self.y);
        dst.put_u32_le(self.state);
        dst.put_u32_le(self.button);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            ty: src.get_u32_le(),
            x: src.get_i32_le(),
            y: src.get_i32_le(),
            state: src.get_u32_le(),
            button: src.get_u32_le(),
        }
    }
}

// ── Motion ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motion {
    pub x: i32,
    pub y: i32,
    pub state: u32,
    pub is_hint: u32,
}

impl WireBody for Motion {
    const SIZE: usize = 16;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.x);
        dst.put_i32_le(self.y);
        dst.put_u32_le(self.state);
        dst.put_u32_le(self.is_hint);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            x: src.get_i32_le(),
            y: src.get_i32_le(),
            state: src.get_u32_le(),
            is_hint: src.get_u32_le(),
        }
    }
}

// ── Configure ────────────────────────────────────────────────────

/// Window geometry notification. Used in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Configure {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub override_redirect: u32,
}

impl WireBody for Configure {
    const SIZE: usize = 20;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.x);
        dst.put_i32_le(self.y);
        dst.put_u32_le(self.width);
        dst.put_u32_le(self.height);
        dst.put_u32_le(self.override_redirect);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            x: src.get_i32_le(),
            y: src.get_i32_le(),
            width: src.get_u32_le(),
            height: src.get_u32_le(),
            override_redirect: src.get_u32_le(),
        }
    }
}

// ── KeyBitmap / KeymapNotify ─────────────────────────────────────

/// One bit per keycode, keycode `n` at byte `n / 8`, bit `n % 8`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyBitmap([u8; 32]);

impl KeyBitmap {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn get(&self, keycode: u8) -> bool {
        (self.0[keycode as usize / 8] >> (keycode % 8)) & 1 == 1
    }

    pub fn set(&mut self, keycode: u8, pressed: bool) {
        let byte = &mut self.0[keycode as usize / 8];
        if pressed {
            *byte |= 1 << (keycode % 8);
        } else {
            *byte &= !(1 << (keycode % 8));
        }
    }

    /// Keycodes whose bit is set, ascending.
    pub fn pressed(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|&k| self.get(k))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl std::fmt::Debug for KeyBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.pressed()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeymapNotify {
    pub keys: KeyBitmap,
}

impl WireBody for KeymapNotify {
    const SIZE: usize = 32;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_slice(self.keys.as_bytes());
    }

    fn get(src: &mut impl Buf) -> Self {
        let mut bytes = [0u8; 32];
        src.copy_to_slice(&mut bytes);
        Self {
            keys: KeyBitmap::from_bytes(bytes),
        }
    }
}

// ── PeerConfig ───────────────────────────────────────────────────

/// The daemon's reply to the version handshake (its X server setup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerConfig {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mem: u32,
}

impl WireBody for PeerConfig {
    const SIZE: usize = 16;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.width);
        dst.put_u32_le(self.height);
        dst.put_u32_le(self.depth);
        dst.put_u32_le(self.mem);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            width: src.get_u32_le(),
            height: src.get_u32_le(),
            depth: src.get_u32_le(),
            mem: src.get_u32_le(),
        }
    }
}
