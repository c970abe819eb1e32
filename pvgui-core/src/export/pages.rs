//! Page-table math for the shared framebuffer.

use crate::error::GuiError;
use crate::protocol::PageId;

pub const PAGE_SIZE: usize = 4096;

/// Translates a virtual address into the frame number backing it.
pub trait PageResolver {
    fn resolve_page(&mut self, addr: usize) -> Result<PageId, GuiError>;
}

impl<F> PageResolver for F
where
    F: FnMut(usize) -> Result<PageId, GuiError>,
{
    fn resolve_page(&mut self, addr: usize) -> Result<PageId, GuiError> {
        self(addr)
    }
}

/// Offset of `addr` within its page and the number of pages covering
/// `len` bytes starting there.
pub fn page_span(addr: usize, len: usize) -> (usize, usize) {
    let offset = addr & (PAGE_SIZE - 1);
    (offset, (len + offset).div_ceil(PAGE_SIZE))
}

/// One address inside each page covering `[addr, addr + len)`.
pub fn page_addresses(addr: usize, len: usize) -> impl Iterator<Item = usize> {
    let (_, count) = page_span(addr, len);
    (0..count).map(move |i| addr + i * PAGE_SIZE)
}

/// Resolve every page covering `[addr, addr + len)`, in order.
pub fn resolve_pages(
    resolver: &mut impl PageResolver,
    addr: usize,
    len: usize,
) -> Result<Vec<PageId>, GuiError> {
    let (_, count) = page_span(addr, len);
    let mut pages = Vec::new();
    pages
        .try_reserve_exact(count)
        .map_err(|_| GuiError::Allocation {
            what: "page list",
            bytes: count * std::mem::size_of::<PageId>(),
        })?;
    for page_addr in page_addresses(addr, len) {
        pages.push(resolver.resolve_page(page_addr)?);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(addr: usize) -> Result<PageId, GuiError> {
        Ok((addr / PAGE_SIZE) as PageId)
    }

    #[test]
    fn framebuffer_crossing_page_boundary() {
        let len = 4 * 1024 * 768;
        let (offset, count) = page_span(0x10_0000 + 100, len);
        assert_eq!(offset, 100);
        assert_eq!(count, (len + 100).div_ceil(PAGE_SIZE));
        assert_eq!(count, 769);
    }

    #[test]
    fn aligned_span() {
        assert_eq!(page_span(0x2000, 4096), (0, 1));
        assert_eq!(page_span(0x2000, 4097), (0, 2));
        assert_eq!(page_span(0x2FFF, 2), (4095, 2));
        assert_eq!(page_span(0x2000, 0), (0, 0));
    }

    #[test]
    fn pages_resolve_in_order() {
        let mut resolver = identity;
        let pages = resolve_pages(&mut resolver, 3 * PAGE_SIZE + 8, 2 * PAGE_SIZE).unwrap();
        assert_eq!(pages, vec![3, 4, 5]);
    }

    #[test]
    fn resolver_failure_propagates() {
        let mut calls = 0;
        let mut resolver = |addr: usize| -> Result<PageId, GuiError> {
            calls += 1;
            if calls == 2 {
                Err(GuiError::PageResolve {
                    addr,
                    reason: "not present".into(),
                })
            } else {
                Ok(1)
            }
        };
        let err = resolve_pages(&mut resolver, 0, 3 * PAGE_SIZE).unwrap_err();
        assert!(matches!(err, GuiError::PageResolve { addr: PAGE_SIZE, .. }));
    }
}
