//! Keycode → scancode table.
//!
//! Entries are PC/AT set-1 scancodes packed big-endian into a `u32`: the
//! most significant non-zero byte is sent first, so `0xE048` is the
//! two-byte sequence `E0 48`. Zero means unmapped.

use std::fmt;

/// Offset between X (evdev) keycodes and Linux input keycodes.
const EVDEV_OFFSET: u8 = 8;

/// X keycodes whose scancode carries an `E0` (or `E1`) prefix.
const EXTENDED: &[(u8, u32)] = &[
    (104, 0xE01C), // KP_Enter
    (105, 0xE01D), // Control_R
    (106, 0xE035), // KP_Divide
    (107, 0xE037), // Print
    (108, 0xE038), // Alt_R
    (110, 0xE047), // Home
    (111, 0xE048), // Up
    (112, 0xE049), // Prior
    (113, 0xE04B), // Left
    (114, 0xE04D), // Right
    (115, 0xE04F), // End
    (116, 0xE050), // Down
    (117, 0xE051), // Next
    (118, 0xE052), // Insert
    (119, 0xE053), // Delete
    (127, 0xE1_1D45), // Pause
    (133, 0xE05B), // Super_L
    (134, 0xE05C), // Super_R
    (135, 0xE05D), // Menu
];

#[derive(Clone, PartialEq, Eq)]
pub struct Keymap {
    table: [u32; 256],
}

impl Keymap {
    /// A table with every keycode unmapped.
    pub fn empty() -> Self {
        Self { table: [0; 256] }
    }

    /// Evdev keycodes to set-1 scancodes.
    ///
    /// The base block (Escape through F12) is a fixed offset from the
    /// Linux keycode, which equals the set-1 make code.
    pub fn evdev() -> Self {
        let mut map = Self::empty();
        for linux in 1..=88u8 {
            // 84 is unassigned; 85 has no set-1 code at that value.
            if linux == 84 || linux == 85 {
                continue;
            }
            map.set(linux + EVDEV_OFFSET, u32::from(linux));
        }
        for &(keycode, scancode) in EXTENDED {
            map.set(keycode, scancode);
        }
        map
    }

    pub fn get(&self, keycode: u8) -> u32 {
        self.table[keycode as usize]
    }

    pub fn set(&mut self, keycode: u8, scancode: u32) {
        self.table[keycode as usize] = scancode;
    }

    /// Apply `(keycode, scancode)` overrides on top of this table.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = (u8, u32)>) -> Self {
        for (keycode, scancode) in overrides {
            self.set(keycode, scancode);
        }
        self
    }

    /// Number of mapped keycodes.
    pub fn mapped(&self) -> usize {
        self.table.iter().filter(|&&s| s != 0).count()
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::evdev()
    }
}

impl fmt::Debug for Keymap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keymap")
            .field("mapped", &self.mapped())
            .finish()
    }
}

/// The bytes of `scancode` to emit, most significant first. Zero bytes
/// are skipped except the low byte, which is always present.
pub fn scancode_bytes(scancode: u32) -> impl Iterator<Item = u8> {
    let [b3, b2, b1, b0] = scancode.to_be_bytes();
    [b3, b2, b1]
        .into_iter()
        .filter(|&b| b != 0)
        .chain(std::iter::once(b0))
}
