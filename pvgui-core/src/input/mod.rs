//! Input translation: peer key/pointer events → local injection sink.
//!
//! The translator owns the pressed-key bitmap and the held-button mask.
//! Both outlive a connection: they track local hardware state, not the
//! display link.

pub mod keymap;

use tracing::{debug, trace, warn};

use crate::error::GuiError;
use crate::flags::{LedState, ModifierState, PointerButtons};
use crate::protocol::inbound::{Button, KeyBitmap, KeyPress, Motion};

pub use keymap::{Keymap, scancode_bytes};

/// Caps-Lock keycode; never triggers a lock resync of its own.
pub const CAPS_LOCK_KEYCODE: u8 = 66;
/// Num-Lock keycode; never triggers a lock resync of its own.
pub const NUM_LOCK_KEYCODE: u8 = 77;

/// Release bit of a set-1 scancode byte.
const RELEASE_BIT: u32 = 0x80;

/// Upper bound of the absolute pointer range on each axis.
pub const ABSOLUTE_MAX: i32 = 0x7FFF;

// ── InputSink ────────────────────────────────────────────────────

/// Where translated input ends up (an emulated keyboard/mouse).
pub trait InputSink {
    /// Inject one scancode byte.
    fn inject_keycode(&mut self, code: u8);

    /// Inject a pointer event. `x`/`y` are absolute in
    /// `0..=ABSOLUTE_MAX` or deltas, depending on
    /// [`is_pointer_absolute`](Self::is_pointer_absolute).
    fn inject_pointer(&mut self, x: i32, y: i32, wheel: i32, buttons: PointerButtons);

    /// Current keyboard LED state.
    fn lock_led_state(&self) -> LedState;

    fn is_pointer_absolute(&self) -> bool;
}

// ── InputTranslator ──────────────────────────────────────────────

#[derive(Debug)]
pub struct InputTranslator<S> {
    sink: S,
    keymap: Keymap,
    keys: KeyBitmap,
    buttons: PointerButtons,
    pointer: (i32, i32),
}

impl<S: InputSink> InputTranslator<S> {
    pub fn new(sink: S, keymap: Keymap) -> Self {
        Self {
            sink,
            keymap,
            keys: KeyBitmap::default(),
            buttons: PointerButtons::empty(),
            pointer: (0, 0),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Keycodes currently held, as far as this side knows.
    pub fn keys(&self) -> &KeyBitmap {
        &self.keys
    }

    pub fn buttons(&self) -> PointerButtons {
        self.buttons
    }

    /// Last pointer position, in framebuffer pixels.
    pub fn pointer(&self) -> (i32, i32) {
        self.pointer
    }

    // ── Keyboard ─────────────────────────────────────────────────

    /// Handle a peer key event: resync the lock keys, then translate.
    pub fn handle_key(&mut self, key: &KeyPress) -> Result<(), GuiError> {
        let Ok(keycode) = u8::try_from(key.keycode) else {
            warn!(keycode = key.keycode, "keycode out of range, dropped");
            return Ok(());
        };
        if keycode != CAPS_LOCK_KEYCODE && keycode != NUM_LOCK_KEYCODE {
            self.sync_locks(key.modifiers())?;
        }
        self.translate_key(keycode, key.is_release())?;
        Ok(())
    }

    /// Emit the scancode sequence for one key transition. Returns the
    /// number of bytes injected.
    ///
    /// The pressed-key bitmap is updated even when the keycode has no
    /// mapping, so a later keymap snapshot can still release it.
    pub fn translate_key(&mut self, keycode: u8, release: bool) -> Result<usize, GuiError> {
        self.keys.set(keycode, !release);

        let scancode = self.keymap.get(keycode);
        trace!(keycode, scancode, release, "key");
        if scancode == 0 {
            return Err(GuiError::UnmappedKeycode(keycode));
        }
        if release && scancode & RELEASE_BIT != 0 {
            return Ok(0);
        }

        let scancode = if release {
            scancode | RELEASE_BIT
        } else {
            scancode
        };
        let mut sent = 0;
        for byte in scancode_bytes(scancode) {
            self.sink.inject_keycode(byte);
            sent += 1;
        }
        Ok(sent)
    }

    /// Toggle Caps/Num-Lock locally when their LED disagrees with the
    /// modifier state the peer reports.
    ///
    /// A lock key missing from the keymap is skipped; it never costs the
    /// key event that triggered the check.
    pub fn sync_locks(&mut self, state: ModifierState) -> Result<(), GuiError> {
        let leds = self.sink.lock_led_state();
        let pairs = [
            (LedState::CAPS_LOCK, ModifierState::LOCK, CAPS_LOCK_KEYCODE),
            (LedState::NUM_LOCK, ModifierState::MOD2, NUM_LOCK_KEYCODE),
        ];
        for (led, modifier, keycode) in pairs {
            if leds.contains(led) == state.contains(modifier) {
                continue;
            }
            if self.keymap.get(keycode) == 0 {
                warn!(keycode, "lock key has no scancode, not resyncing");
                continue;
            }
            debug!(keycode, "resyncing lock key");
            self.translate_key(keycode, false)?;
            self.translate_key(keycode, true)?;
        }
        Ok(())
    }

    /// Release every key held locally but absent from the peer's
    /// snapshot. Returns how many releases were synthesized.
    pub fn translate_keymap_notify(&mut self, remote: &KeyBitmap) -> usize {
        let stale: Vec<u8> = self.keys.pressed().filter(|&k| !remote.get(k)).collect();
        for &keycode in &stale {
            debug!(keycode, "releasing key missing from peer keymap");
            if let Err(e) = self.translate_key(keycode, true) {
                warn!(keycode, error = %e, "release dropped");
            }
        }
        stale.len()
    }

    // ── Pointer ──────────────────────────────────────────────────

    /// Move the pointer to the peer's position within a
    /// `width`×`height` framebuffer.
    pub fn translate_motion(&mut self, motion: &Motion, width: u32, height: u32) {
        let x = clamp(motion.x, width);
        let y = clamp(motion.y, height);
        if self.sink.is_pointer_absolute() {
            let (ax, ay) = (scale(x, width), scale(y, height));
            self.sink.inject_pointer(ax, ay, 0, self.buttons);
        } else {
            let (px, py) = self.pointer;
            self.sink.inject_pointer(x - px, y - py, 0, self.buttons);
        }
        self.pointer = (x, y);
    }

    /// Press or release a button, or scroll for buttons 4 and 5.
    pub fn translate_button(
        &mut self,
        event: &Button,
        width: u32,
        height: u32,
    ) -> Result<(), GuiError> {
        self.sync_locks(event.modifiers())?;

        let (button, wheel) = match event.button {
            1 => (PointerButtons::LEFT, 0),
            2 => (PointerButtons::MIDDLE, 0),
            3 => (PointerButtons::RIGHT, 0),
            4 => (PointerButtons::empty(), -1),
            5 => (PointerButtons::empty(), 1),
            other => {
                warn!(button = other, "unknown pointer button");
                return Ok(());
            }
        };
        if event.is_press() {
            self.buttons.insert(button);
        } else {
            self.buttons.remove(button);
        }

        if self.sink.is_pointer_absolute() {
            let (x, y) = (clamp(self.pointer.0, width), clamp(self.pointer.1, height));
            self.sink
                .inject_pointer(scale(x, width), scale(y, height), wheel, self.buttons);
        } else {
            self.sink.inject_pointer(0, 0, wheel, self.buttons);
        }
        Ok(())
    }
}

/// Clamp a coordinate to `[0, dim - 1]`.
fn clamp(v: i32, dim: u32) -> i32 {
    let max = dim.saturating_sub(1).min(i32::MAX as u32) as i32;
    v.clamp(0, max)
}

/// Map `[0, dim - 1]` onto `[0, ABSOLUTE_MAX]`.
fn scale(v: i32, dim: u32) -> i32 {
    if dim <= 1 {
        return 0;
    }
    (i64::from(v) * i64::from(ABSOLUTE_MAX) / (i64::from(dim) - 1)) as i32
}
