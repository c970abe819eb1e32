//! Pixel conversion into the exported `0x00RRGGBB` format.
//!
//! Every converter reads a rectangle of the source surface and writes the
//! same rectangle of a `width`-pixel-wide destination buffer.

use crate::display::Rect;

/// Expand RGB565 pixels. `src_stride` is in bytes.
pub fn rgb565_to_rgb888(src: &[u8], src_stride: usize, dst: &mut [u32], dst_width: usize, rect: Rect) {
    for row in rect.y as usize..(rect.y + rect.height) as usize {
        for col in rect.x as usize..(rect.x + rect.width) as usize {
            let at = row * src_stride + col * 2;
            let Some(bytes) = src.get(at..at + 2) else {
                return;
            };
            let p = u32::from(u16::from_le_bytes([bytes[0], bytes[1]]));
            let r = (p >> 11) << 3;
            let g = ((p & 0x7FF) >> 5) << 2;
            let b = (p & 0x1F) << 3;
            if let Some(out) = dst.get_mut(row * dst_width + col) {
                *out = (r << 16) | (g << 8) | b;
            }
        }
    }
}

/// Expand RGB332 pixels. `src_stride` is in bytes.
pub fn rgb332_to_rgb888(src: &[u8], src_stride: usize, dst: &mut [u32], dst_width: usize, rect: Rect) {
    for row in rect.y as usize..(rect.y + rect.height) as usize {
        for col in rect.x as usize..(rect.x + rect.width) as usize {
            let Some(&p) = src.get(row * src_stride + col) else {
                return;
            };
            let p = u32::from(p);
            let r = (p >> 5) << 5;
            let g = ((p & 0x1F) >> 2) << 5;
            let b = (p & 0x3) << 6;
            if let Some(out) = dst.get_mut(row * dst_width + col) {
                *out = (r << 16) | (g << 8) | b;
            }
        }
    }
}

/// Widen packed 24bpp `B G R` triples. `src_stride` is in bytes.
pub fn bgr24_to_rgb888(src: &[u8], src_stride: usize, dst: &mut [u32], dst_width: usize, rect: Rect) {
    for row in rect.y as usize..(rect.y + rect.height) as usize {
        for col in rect.x as usize..(rect.x + rect.width) as usize {
            let at = row * src_stride + col * 3;
            let Some(bytes) = src.get(at..at + 3) else {
                return;
            };
            if let Some(out) = dst.get_mut(row * dst_width + col) {
                *out = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            }
        }
    }
}

/// Copy 32bpp words out of a padded surface, clearing the unused byte.
/// `src_stride` is in bytes.
pub fn xrgb8888_to_rgb888(src: &[u8], src_stride: usize, dst: &mut [u32], dst_width: usize, rect: Rect) {
    for row in rect.y as usize..(rect.y + rect.height) as usize {
        for col in rect.x as usize..(rect.x + rect.width) as usize {
            let at = row * src_stride + col * 4;
            let Some(bytes) = src.get(at..at + 4) else {
                return;
            };
            if let Some(out) = dst.get_mut(row * dst_width + col) {
                *out = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            }
        }
    }
}
