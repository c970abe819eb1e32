//! Bit sets carried on the wire or exchanged with the input sink.

use bitflags::bitflags;

bitflags! {
    /// X11 modifier state carried in key and button events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierState: u32 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        /// Num-Lock on the daemon side.
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

bitflags! {
    /// Keyboard LED state reported by the local input sink.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LedState: u32 {
        const SCROLL_LOCK = 1 << 0;
        const NUM_LOCK = 1 << 1;
        const CAPS_LOCK = 1 << 2;
    }
}

bitflags! {
    /// Pointer buttons currently held, as handed to the input sink.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PointerButtons: u32 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

bitflags! {
    /// Window size hint flags (XSizeHints subset).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HintFlags: u32 {
        const POSITION = 1 << 2;
        const SIZE = 1 << 3;
        const MIN_SIZE = 1 << 4;
        const MAX_SIZE = 1 << 5;
        const RESIZE_INC = 1 << 6;
        const ASPECT = 1 << 7;
        const BASE_SIZE = 1 << 8;
        const WIN_GRAVITY = 1 << 9;
    }
}
