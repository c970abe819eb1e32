//! Headless framebuffer backend and a logging input sink.
//!
//! Used when the agent runs without an emulator behind it: the
//! framebuffer is a private buffer painted with a test pattern, and
//! injected input is only traced. Nothing ever draws into it, so a
//! [`spawn_repaint`] ticker stands in for the emulator's refresh and
//! keeps announcing the whole frame as damaged.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pvgui_core::{
    DisplayEvent, GraphicsBackend, InputSink, LedState, PixelFormat, PointerButtons, Rect,
    Surface, SurfaceId,
};

// ── HeadlessDisplay ──────────────────────────────────────────────

#[derive(Debug)]
pub struct HeadlessDisplay {
    id: SurfaceId,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32, bits_per_pixel: u32) -> Self {
        let mut display = Self {
            id: 0,
            width: 0,
            height: 0,
            format: PixelFormat::from_bpp(bits_per_pixel),
            data: Vec::new(),
        };
        display.allocate(width, height);
        display
    }

    fn stride(&self) -> usize {
        (self.width as usize * self.format.bits_per_pixel() as usize).div_ceil(8)
    }

    fn allocate(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.id += 1;
        self.data = vec![0; self.stride() * height as usize];
        self.paint();
        info!(width, height, format = %self.format, "headless framebuffer allocated");
    }

    /// The whole frame, as one damage rectangle.
    pub fn full_damage(&self) -> DisplayEvent {
        DisplayEvent::Damage(Rect::new(0, 0, self.width, self.height))
    }

    /// Horizontal gradient; also makes every page resident.
    fn paint(&mut self) {
        let stride = self.stride().max(1);
        for (i, byte) in self.data.iter_mut().enumerate() {
            *byte = ((i % stride) * 255 / stride) as u8;
        }
    }
}

impl GraphicsBackend for HeadlessDisplay {
    fn surface(&self) -> Surface<'_> {
        Surface {
            id: self.id,
            width: self.width,
            height: self.height,
            stride: self.stride(),
            format: self.format,
            data: &self.data,
        }
    }
}

/// Send `damage` every `period` until the receiving session goes away.
pub fn spawn_repaint(
    events: mpsc::Sender<DisplayEvent>,
    damage: DisplayEvent,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if events.send(damage).await.is_err() {
                debug!("display event receiver gone, repaint stopped");
                break;
            }
        }
    })
}

// ── LoggingSink ──────────────────────────────────────────────────

/// Records lock state and traces everything it is asked to inject.
#[derive(Debug, Default)]
pub struct LoggingSink {
    leds: LedState,
    absolute: bool,
    injected: u64,
}

impl LoggingSink {
    pub fn new(absolute: bool) -> Self {
        Self {
            absolute,
            ..Self::default()
        }
    }

    /// Scancode bytes and pointer events injected so far.
    pub fn injected(&self) -> u64 {
        self.injected
    }

    pub fn leds(&self) -> LedState {
        self.leds
    }
}

impl InputSink for LoggingSink {
    fn inject_keycode(&mut self, code: u8) {
        // Lock keys toggle on press only.
        match code {
            0x3A => self.leds.toggle(LedState::CAPS_LOCK),
            0x45 => self.leds.toggle(LedState::NUM_LOCK),
            _ => {}
        }
        self.injected += 1;
        debug!("scancode {code:#04x}");
    }

    fn inject_pointer(&mut self, x: i32, y: i32, wheel: i32, buttons: PointerButtons) {
        self.injected += 1;
        debug!(x, y, wheel, ?buttons, "pointer");
    }

    fn lock_led_state(&self) -> LedState {
        self.leds
    }

    fn is_pointer_absolute(&self) -> bool {
        self.absolute
    }
}
