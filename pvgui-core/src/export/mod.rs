//! Shared-framebuffer export.
//!
//! The framebuffer is published as a list of page frame numbers the peer
//! maps directly, always as `width * height` four-byte pixels. Surfaces
//! laid out any other way (low depth, packed 24bpp, padded rows) are
//! first expanded into a private conversion buffer, and that buffer's
//! pages are exported instead.

pub mod convert;
pub mod pages;

use tracing::{debug, info, warn};

use crate::display::{PixelFormat, Rect, Surface};
use crate::error::GuiError;
use crate::protocol::PageList;

pub use pages::{PAGE_SIZE, PageResolver, page_addresses, page_span, resolve_pages};

/// Depth announced in every page list.
pub const EXPORT_BPP: u32 = 24;

/// Bytes per exported pixel.
pub const EXPORT_BYTES_PER_PIXEL: usize = 4;

#[derive(Debug)]
pub struct Exporter<R> {
    resolver: R,
    conversion: Option<Vec<u32>>,
}

impl<R: PageResolver> Exporter<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            conversion: None,
        }
    }

    /// `true` while a low-depth surface is being mirrored.
    pub fn is_converting(&self) -> bool {
        self.conversion.is_some()
    }

    /// Build the page list for `surface`, converting it first if needed.
    ///
    /// Every exported byte lies inside storage this exporter can see:
    /// either the surface itself, when it is tightly packed 32bpp, or the
    /// conversion buffer.
    pub fn export(&mut self, surface: &Surface<'_>) -> Result<PageList, GuiError> {
        check_layout(surface)?;
        let pixels = surface.width as usize * surface.height as usize;
        let len = EXPORT_BYTES_PER_PIXEL * pixels;

        let addr = if is_direct(surface) {
            self.conversion = None;
            surface.base_addr()
        } else {
            info!(format = %surface.format, stride = surface.stride, "converting surface to 24bpp");
            let buffer = self.conversion_buffer(pixels)?;
            convert_rect(surface, buffer, full(surface));
            buffer.as_ptr() as usize
        };

        let (offset, count) = page_span(addr, len);
        debug!(
            count,
            offset,
            width = surface.width,
            height = surface.height,
            "resolving framebuffer pages"
        );
        let pages = resolve_pages(&mut self.resolver, addr, len)?;
        Ok(PageList {
            width: surface.width,
            height: surface.height,
            bpp: EXPORT_BPP,
            offset: offset as u32,
            pages,
        })
    }

    /// Re-convert the damaged part of `surface`. A no-op for surfaces
    /// exported directly. Returns the clipped rectangle.
    pub fn refresh(&mut self, surface: &Surface<'_>, rect: Rect) -> Rect {
        let rect = rect.clip(surface.width, surface.height);
        if let Some(buffer) = self.conversion.as_mut() {
            convert_rect(surface, buffer, rect);
        }
        rect
    }

    fn conversion_buffer(&mut self, pixels: usize) -> Result<&mut Vec<u32>, GuiError> {
        let buffer = self.conversion.get_or_insert_with(Vec::new);
        if buffer.len() != pixels {
            buffer.clear();
            buffer.shrink_to_fit();
            buffer
                .try_reserve_exact(pixels)
                .map_err(|_| GuiError::Allocation {
                    what: "conversion buffer",
                    bytes: pixels * EXPORT_BYTES_PER_PIXEL,
                })?;
            buffer.resize(pixels, 0);
        }
        Ok(buffer)
    }
}

fn full(surface: &Surface<'_>) -> Rect {
    Rect::new(0, 0, surface.width, surface.height)
}

/// Tightly packed four-byte pixels: the peer can map the surface as is.
fn is_direct(surface: &Surface<'_>) -> bool {
    surface.format.is_native()
        && surface.stride == surface.width as usize * EXPORT_BYTES_PER_PIXEL
}

/// Reject surfaces whose rows or storage are smaller than their
/// dimensions claim.
fn check_layout(surface: &Surface<'_>) -> Result<(), GuiError> {
    let bytes_pp = match surface.format {
        PixelFormat::Other(bpp) => {
            warn!(bpp, "unsupported depth");
            return Err(GuiError::UnsupportedSurface(format!("{bpp}bpp")));
        }
        format => format.bits_per_pixel() as usize / 8,
    };
    let row = surface.width as usize * bytes_pp;
    if surface.stride < row {
        return Err(GuiError::UnsupportedSurface(format!(
            "stride {} below row size {row}",
            surface.stride
        )));
    }
    let needed = match surface.height as usize {
        0 => 0,
        rows => surface.stride * (rows - 1) + row,
    };
    if surface.data.len() < needed {
        return Err(GuiError::UnsupportedSurface(format!(
            "{} bytes of storage for a {}x{} {} surface",
            surface.data.len(),
            surface.width,
            surface.height,
            surface.format
        )));
    }
    Ok(())
}

fn convert_rect(surface: &Surface<'_>, dst: &mut [u32], rect: Rect) {
    let (src, stride, width) = (surface.data, surface.stride, surface.width as usize);
    match surface.format {
        PixelFormat::Rgb565 => convert::rgb565_to_rgb888(src, stride, dst, width, rect),
        PixelFormat::Rgb332 => convert::rgb332_to_rgb888(src, stride, dst, width, rect),
        PixelFormat::Rgb888 => convert::bgr24_to_rgb888(src, stride, dst, width, rect),
        PixelFormat::Xrgb8888 => convert::xrgb8888_to_rgb888(src, stride, dst, width, rect),
        PixelFormat::Other(_) => {}
    }
}
