//! Agent → daemon bodies.
//!
//! [`Outbound`] is the tagged union the codec encodes; each variant knows
//! its message type and exact body length, so the header's declared
//! length always matches what follows it.

use bytes::{Buf, BufMut};

use crate::error::GuiError;
use crate::flags::HintFlags;
use crate::message::MsgType;
use crate::protocol::WireBody;

pub use crate::protocol::inbound::Configure;

/// Physical/machine frame number of one shared page.
pub type PageId = u32;

// ── CreateWindow ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateWindow {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub parent: u32,
    pub override_redirect: u32,
}

impl WireBody for CreateWindow {
    const SIZE: usize = 24;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.x);
        dst.put_i32_le(self.y);
        dst.put_u32_le(self.width);
        dst.put_u32_le(self.height);
        dst.put_u32_le(self.parent);
        dst.put_u32_le(self.override_redirect);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            x: src.get_i32_le(),
            y: src.get_i32_le(),
            width: src.get_u32_le(),
            height: src.get_u32_le(),
            parent: src.get_u32_le(),
            override_redirect: src.get_u32_le(),
        }
    }
}

// ── MapInfo ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapInfo {
    pub transient_for: u32,
    pub override_redirect: u32,
}

impl WireBody for MapInfo {
    const SIZE: usize = 8;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.transient_for);
        dst.put_u32_le(self.override_redirect);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            transient_for: src.get_u32_le(),
            override_redirect: src.get_u32_le(),
        }
    }
}

// ── WindowHints ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowHints {
    pub flags: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub width_inc: u32,
    pub height_inc: u32,
    pub base_width: u32,
    pub base_height: u32,
}

impl WindowHints {
    /// Hints pinning the window at exactly `width`×`height`.
    pub fn fixed_size(width: u32, height: u32) -> Self {
        Self {
            flags: (HintFlags::MIN_SIZE | HintFlags::MAX_SIZE).bits(),
            min_width: width,
            min_height: height,
            max_width: width,
            max_height: height,
            ..Default::default()
        }
    }
}

impl WireBody for WindowHints {
    const SIZE: usize = 36;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.flags);
        dst.put_u32_le(self.min_width);
        dst.put_u32_le(self.min_height);
        dst.put_u32_le(self.max_width);
        dst.put_u32_le(self.max_height);
        dst.put_u32_le(self.width_inc);
        dst.put_u32_le(self.height_inc);
        dst.put_u32_le(self.base_width);
        dst.put_u32_le(self.base_height);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            flags: src.get_u32_le(),
            min_width: src.get_u32_le(),
            min_height: src.get_u32_le(),
            max_width: src.get_u32_le(),
            max_height: src.get_u32_le(),
            width_inc: src.get_u32_le(),
            height_inc: src.get_u32_le(),
            base_width: src.get_u32_le(),
            base_height: src.get_u32_le(),
        }
    }
}

// ── WmName ───────────────────────────────────────────────────────

/// Window title in a fixed, NUL-padded buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WmName([u8; WmName::SIZE]);

impl WmName {
    /// Copy `name` in, truncated at a character boundary so that at
    /// least one terminating NUL remains.
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(Self::SIZE - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = [0u8; Self::SIZE];
        buf[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self(buf)
    }

    /// The name up to the first NUL.
    pub fn name(&self) -> String {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(Self::SIZE);
        String::from_utf8_lossy(&self.0[..len]).into_owned()
    }
}

impl std::fmt::Debug for WmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WmName").field(&self.name()).finish()
    }
}

impl WireBody for WmName {
    const SIZE: usize = 128;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.0);
    }

    fn get(src: &mut impl Buf) -> Self {
        let mut buf = [0u8; Self::SIZE];
        src.copy_to_slice(&mut buf);
        Self(buf)
    }
}

// ── ShmImage ─────────────────────────────────────────────────────

/// Damage rectangle: the daemon re-reads these pixels from shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShmImage {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WireBody for ShmImage {
    const SIZE: usize = 16;

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.x);
        dst.put_i32_le(self.y);
        dst.put_u32_le(self.width);
        dst.put_u32_le(self.height);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            x: src.get_i32_le(),
            y: src.get_i32_le(),
            width: src.get_u32_le(),
            height: src.get_u32_le(),
        }
    }
}

// ── PageList ─────────────────────────────────────────────────────

/// Framebuffer published as a table of page identifiers.
///
/// ```text
/// shmid:    u32  (4)   always 0
/// width:    u32  (4)
/// height:   u32  (4)
/// bpp:      u32  (4)
/// off:      u32  (4)   byte offset of the first pixel in the first page
/// num_mfn:  u32  (4)
/// domid:    u32  (4)   always 0
/// mfns:     [u32; num_mfn]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageList {
    pub width: u32,
    pub height: u32,
    pub bpp: u32,
    pub offset: u32,
    pub pages: Vec<PageId>,
}

impl PageList {
    /// Size of the fixed part preceding the page identifiers.
    pub const FIXED_SIZE: usize = 28;

    pub fn body_len(&self) -> usize {
        Self::FIXED_SIZE + self.pages.len() * 4
    }

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(0);
        dst.put_u32_le(self.width);
        dst.put_u32_le(self.height);
        dst.put_u32_le(self.bpp);
        dst.put_u32_le(self.offset);
        dst.put_u32_le(self.pages.len() as u32);
        dst.put_u32_le(0);
        for &page in &self.pages {
            dst.put_u32_le(page);
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, GuiError> {
        if data.len() < Self::FIXED_SIZE {
            return Err(GuiError::InvalidPayload {
                expected: Self::FIXED_SIZE,
                actual: data.len(),
            });
        }
        let mut src = data;
        let _shmid = src.get_u32_le();
        let width = src.get_u32_le();
        let height = src.get_u32_le();
        let bpp = src.get_u32_le();
        let offset = src.get_u32_le();
        let count = src.get_u32_le() as usize;
        let _domid = src.get_u32_le();

        let expected = Self::FIXED_SIZE + count * 4;
        if data.len() != expected {
            return Err(GuiError::InvalidPayload {
                expected,
                actual: data.len(),
            });
        }
        let pages = (0..count).map(|_| src.get_u32_le()).collect();
        Ok(Self {
            width,
            height,
            bpp,
            offset,
            pages,
        })
    }
}

// ── Outbound ─────────────────────────────────────────────────────

/// Every message the agent sends after the version handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Create(CreateWindow),
    Configure(Configure),
    Map(MapInfo),
    WindowHints(WindowHints),
    WmName(WmName),
    ShmImage(ShmImage),
    MfnDump(PageList),
}

impl Outbound {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Outbound::Create(_) => MsgType::Create,
            Outbound::Configure(_) => MsgType::Configure,
            Outbound::Map(_) => MsgType::Map,
            Outbound::WindowHints(_) => MsgType::WindowHints,
            Outbound::WmName(_) => MsgType::WmName,
            Outbound::ShmImage(_) => MsgType::ShmImage,
            Outbound::MfnDump(_) => MsgType::MfnDump,
        }
    }

    /// Exact number of body bytes [`put_body`](Self::put_body) writes.
    pub fn body_len(&self) -> usize {
        match self {
            Outbound::Create(_) => CreateWindow::SIZE,
            Outbound::Configure(_) => Configure::SIZE,
            Outbound::Map(_) => MapInfo::SIZE,
            Outbound::WindowHints(_) => WindowHints::SIZE,
            Outbound::WmName(_) => WmName::SIZE,
            Outbound::ShmImage(_) => ShmImage::SIZE,
            Outbound::MfnDump(list) => list.body_len(),
        }
    }

    pub fn put_body(&self, dst: &mut impl BufMut) {
        match self {
            Outbound::Create(m) => m.put(dst),
            Outbound::Configure(m) => m.put(dst),
            Outbound::Map(m) => m.put(dst),
            Outbound::WindowHints(m) => m.put(dst),
            Outbound::WmName(m) => m.put(dst),
            Outbound::ShmImage(m) => m.put(dst),
            Outbound::MfnDump(m) => m.put(dst),
        }
    }

    /// Decode a body as the daemon would. Fixed-size bodies must match
    /// their size exactly.
    pub fn decode(msg_type: MsgType, body: &[u8]) -> Result<Self, GuiError> {
        fn exact<T: WireBody>(body: &[u8]) -> Result<T, GuiError> {
            if body.len() != T::SIZE {
                return Err(GuiError::InvalidPayload {
                    expected: T::SIZE,
                    actual: body.len(),
                });
            }
            T::decode(body)
        }

        Ok(match msg_type {
            MsgType::Create => Outbound::Create(exact(body)?),
            MsgType::Configure => Outbound::Configure(exact(body)?),
            MsgType::Map => Outbound::Map(exact(body)?),
            MsgType::WindowHints => Outbound::WindowHints(exact(body)?),
            MsgType::WmName => Outbound::WmName(exact(body)?),
            MsgType::ShmImage => Outbound::ShmImage(exact(body)?),
            MsgType::MfnDump => Outbound::MfnDump(PageList::decode(body)?),
            _ => {
                return Err(GuiError::UnknownVariant {
                    type_name: "Outbound",
                    value: msg_type as u32,
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Outbound) {
        let mut body = Vec::new();
        msg.put_body(&mut body);
        assert_eq!(body.len(), msg.body_len());
        assert_eq!(Outbound::decode(msg.msg_type(), &body).unwrap(), msg);
    }

    #[test]
    fn fixed_bodies_roundtrip() {
        roundtrip(Outbound::Create(CreateWindow {
            x: -10,
            y: 20,
            width: 1024,
            height: 768,
            parent: 0,
            override_redirect: 0,
        }));
        roundtrip(Outbound::Configure(Configure {
            x: 10,
            y: 20,
            width: 800,
            height: 600,
            override_redirect: 1,
        }));
        roundtrip(Outbound::WindowHints(WindowHints::fixed_size(640, 480)));
        roundtrip(Outbound::WmName(WmName::new("dom0-stubdom")));
        roundtrip(Outbound::Map(MapInfo {
            transient_for: 3,
            override_redirect: 1,
        }));
        roundtrip(Outbound::ShmImage(ShmImage {
            x: -4,
            y: 12,
            width: 64,
            height: 1,
        }));
    }

    #[test]
    fn page_list_roundtrip() {
        let list = PageList {
            width: 16,
            height: 16,
            bpp: 24,
            offset: 100,
            pages: vec![0x1000, 0x1001, 0xdead],
        };
        assert_eq!(list.body_len(), 28 + 12);
        roundtrip(Outbound::MfnDump(list));
    }

    #[test]
    fn page_list_rejects_inconsistent_count() {
        let list = PageList {
            pages: vec![1, 2],
            ..Default::default()
        };
        let mut body = Vec::new();
        list.put(&mut body);
        body.truncate(body.len() - 4);
        assert!(PageList::decode(&body).is_err());
    }

    #[test]
    fn fixed_size_hints() {
        let hints = WindowHints::fixed_size(800, 600);
        assert_eq!(hints.flags, 0x30);
        assert_eq!((hints.min_width, hints.max_width), (800, 800));
        assert_eq!((hints.min_height, hints.max_height), (600, 600));
    }

    #[test]
    fn wm_name_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let name = WmName::new(&long);
        let decoded = name.name();
        assert!(decoded.len() <= 127);
        assert_eq!(decoded, "é".repeat(63));
        assert_eq!(name.encode()[127], 0);
    }

    #[test]
    fn decode_rejects_wrong_size() {
        assert!(Outbound::decode(MsgType::Map, &[0u8; 9]).is_err());
        assert!(Outbound::decode(MsgType::KeyPress, &[0u8; 20]).is_err());
    }
}
