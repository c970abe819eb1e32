//! Graphics backend seam.
//!
//! The backend owns the pixel storage. It exposes the current surface on
//! demand and reports changes as [`DisplayEvent`]s on a channel that the
//! session multiplexes with the transport.

use std::fmt;

use crate::protocol::ShmImage;

/// Identity of a backing store; changes whenever the backend reallocates.
pub type SurfaceId = u64;

// ── PixelFormat ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8 bpp, `RRRGGGBB`.
    Rgb332,
    /// 16 bpp little-endian, `RRRRRGGG GGGBBBBB`.
    Rgb565,
    /// 24 bpp packed, one `B G R` byte triple per pixel.
    Rgb888,
    /// 32 bpp, `0x00RRGGBB` little-endian words.
    Xrgb8888,
    /// Any other depth; cannot be exported.
    Other(u32),
}

impl PixelFormat {
    pub fn from_bpp(bpp: u32) -> Self {
        match bpp {
            8 => Self::Rgb332,
            16 => Self::Rgb565,
            24 => Self::Rgb888,
            32 => Self::Xrgb8888,
            other => Self::Other(other),
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Rgb332 => 8,
            Self::Rgb565 => 16,
            Self::Rgb888 => 24,
            Self::Xrgb8888 => 32,
            Self::Other(bpp) => bpp,
        }
    }

    /// `true` for the one layout the peer maps directly: four bytes
    /// per pixel.
    pub fn is_native(self) -> bool {
        matches!(self, Self::Xrgb8888)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bpp", self.bits_per_pixel())
    }
}

// ── Rect ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The part of `self` inside a `width`×`height` surface.
    pub fn clip(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Coordinates past `i32::MAX` saturate instead of wrapping negative.
impl From<Rect> for ShmImage {
    fn from(r: Rect) -> Self {
        Self {
            x: i32::try_from(r.x).unwrap_or(i32::MAX),
            y: i32::try_from(r.y).unwrap_or(i32::MAX),
            width: r.width,
            height: r.height,
        }
    }
}

// ── Surface ──────────────────────────────────────────────────────

/// A borrowed view of the backend's current framebuffer.
#[derive(Clone, Copy)]
pub struct Surface<'a> {
    pub id: SurfaceId,
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub stride: usize,
    pub format: PixelFormat,
    pub data: &'a [u8],
}

impl Surface<'_> {
    /// Address of the first pixel.
    pub fn base_addr(&self) -> usize {
        self.data.as_ptr() as usize
    }
}

impl fmt::Debug for Surface<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("addr", &format_args!("{:#x}", self.base_addr()))
            .finish()
    }
}

// ── Backend ──────────────────────────────────────────────────────

/// Local change notifications from the graphics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Pixels inside the rectangle changed.
    Damage(Rect),
    /// The surface has new dimensions.
    Resize { width: u32, height: u32 },
    /// The surface moved to new backing storage.
    SurfaceReplaced(SurfaceId),
}

pub trait GraphicsBackend {
    /// The current surface. Only valid until the backend next
    /// reallocates, which it announces with an event.
    fn surface(&self) -> Surface<'_>;
}
