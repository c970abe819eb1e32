//! Page resolution through `/proc/self/pagemap`.
//!
//! Each virtual page has one 64-bit little-endian entry: bit 63 is
//! "present", bits 0-54 hold the page frame number. The kernel zeroes
//! the frame number for readers without `CAP_SYS_ADMIN`.
//!
//! Only resident pages have a frame: buffers must have been written
//! before they are exported.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

use tracing::debug;

use pvgui_core::export::PAGE_SIZE;
use pvgui_core::protocol::PageId;
use pvgui_core::{GuiError, PageResolver};

const ENTRY_SIZE: u64 = 8;
const PRESENT: u64 = 1 << 63;
const PFN_MASK: u64 = (1 << 55) - 1;

#[derive(Debug)]
pub struct PagemapResolver {
    file: File,
}

impl PagemapResolver {
    pub fn open() -> Result<Self, GuiError> {
        Self::open_path(Path::new("/proc/self/pagemap"))
    }

    pub fn open_path(path: &Path) -> Result<Self, GuiError> {
        debug!("opening {}", path.display());
        Ok(Self {
            file: File::open(path)?,
        })
    }
}

impl PageResolver for PagemapResolver {
    fn resolve_page(&mut self, addr: usize) -> Result<PageId, GuiError> {
        let mut raw = [0u8; ENTRY_SIZE as usize];
        let index = (addr / PAGE_SIZE) as u64;
        self.file
            .read_exact_at(&mut raw, index * ENTRY_SIZE)
            .map_err(|e| GuiError::PageResolve {
                addr,
                reason: e.to_string(),
            })?;
        frame_number(u64::from_le_bytes(raw)).map_err(|reason| GuiError::PageResolve {
            addr,
            reason: reason.into(),
        })
    }
}

/// Decode one pagemap entry.
pub fn frame_number(entry: u64) -> Result<PageId, &'static str> {
    if entry & PRESENT == 0 {
        return Err("page not present");
    }
    match entry & PFN_MASK {
        0 => Err("frame number hidden, CAP_SYS_ADMIN required"),
        pfn => PageId::try_from(pfn).map_err(|_| "frame number does not fit 32 bits"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_present_entry() {
        assert_eq!(frame_number(PRESENT | 0x1234), Ok(0x1234));
        // Soft-dirty and exclusive bits are not part of the frame number.
        assert_eq!(frame_number(PRESENT | (1 << 55) | (1 << 56) | 7), Ok(7));
    }

    #[test]
    fn rejects_absent_hidden_and_wide_frames() {
        assert!(frame_number(0x1234).is_err());
        assert!(frame_number(PRESENT).is_err());
        assert!(frame_number(PRESENT | (1 << 40)).is_err());
    }

    #[test]
    fn resolving_own_memory_is_ok_or_recoverable() {
        let Ok(mut resolver) = PagemapResolver::open() else {
            return;
        };
        let buffer = vec![1u8; PAGE_SIZE * 2];
        // Start inside the buffer so the page is certainly resident.
        match resolver.resolve_page(buffer.as_ptr() as usize) {
            Ok(_) => {}
            Err(e) => assert!(e.is_recoverable(), "{e}"),
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(PagemapResolver::open_path(Path::new("/nonexistent/pagemap")).is_err());
    }
}
