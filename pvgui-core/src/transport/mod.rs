//! Byte transport over an inter-domain channel.
//!
//! A [`Channel`] is the ring-buffer link itself (vchan or a stand-in).
//! [`Transport`] layers the exact-size read/write primitives, optional
//! write staging, and the multiplexed [`wait`](Transport::wait) used by
//! the session's event loop.
//!
//! Reads only block when the caller asks for bytes the channel has not
//! announced yet; the dispatcher never does that, it checks
//! [`Transport::data_ready`] first.

pub mod memory;
pub mod staging;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::GuiCodec;
use crate::error::GuiError;
use crate::header::PROTOCOL_VERSION;
use crate::protocol::Outbound;

pub use memory::{MemoryChannel, MemoryConnector, MemoryPeer};
pub use staging::StagingBuffer;

// ── Channel ──────────────────────────────────────────────────────

/// A duplex, flow-controlled byte link to the peer domain.
#[async_trait]
pub trait Channel: Send {
    /// `false` once the peer has gone away.
    fn is_open(&mut self) -> bool;

    /// Bytes that can be read right now without blocking.
    fn data_ready(&mut self) -> usize;

    /// Bytes that can be written right now without blocking.
    fn buffer_space(&mut self) -> usize;

    /// Read at least one byte, blocking if none are ready. `Ok(0)` means
    /// the channel is closed.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write at least one byte, blocking if the ring is full.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Write what fits right now. Never blocks: fails with `WouldBlock`
    /// when nothing does.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Resolve when the peer signals the channel (data, space or close).
    async fn notified(&mut self) -> io::Result<()>;
}

/// Produces channels bound to a (domain, port) pair.
///
/// Waiting for the peer to attach happens here, so it must yield to the
/// runtime rather than block a worker thread.
#[async_trait]
pub trait Connector: Send {
    async fn connect(&mut self, domain: u32, port: u32) -> Result<Box<dyn Channel>, GuiError>;
}

// ── Wake ─────────────────────────────────────────────────────────

/// What ended a [`Transport::wait`].
#[derive(Debug, PartialEq, Eq)]
pub enum Wake<T> {
    /// The channel was signalled.
    Channel,
    /// An event arrived on the auxiliary source.
    Event(T),
    /// Every sender of the auxiliary source has been dropped.
    EventsClosed,
    /// Nothing happened within the timeout.
    Timeout,
}

// ── Transport ────────────────────────────────────────────────────

pub struct Transport {
    channel: Box<dyn Channel>,
    staging: Option<StagingBuffer>,
    codec: GuiCodec,
    scratch: BytesMut,
}

impl Transport {
    /// Wrap `channel`. With `buffered_writes`, writes never block: what
    /// the ring cannot take is kept in a [`StagingBuffer`].
    pub fn new(channel: Box<dyn Channel>, buffered_writes: bool) -> Self {
        Self {
            channel,
            staging: buffered_writes.then(StagingBuffer::new),
            codec: GuiCodec::new(),
            scratch: BytesMut::new(),
        }
    }

    pub fn is_open(&mut self) -> bool {
        self.channel.is_open()
    }

    pub fn data_ready(&mut self) -> usize {
        self.channel.data_ready()
    }

    /// Bytes waiting in the staging buffer.
    pub fn staged(&self) -> usize {
        self.staging.as_ref().map_or(0, StagingBuffer::len)
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), GuiError> {
        read_exact(self.channel.as_mut(), buf)
    }

    /// Read up to `buf.len()` bytes that are already available. Never
    /// blocks; returns 0 when nothing is ready.
    pub fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, GuiError> {
        let n = buf.len().min(self.channel.data_ready());
        if n > 0 {
            self.read_exact(&mut buf[..n])?;
        }
        Ok(n)
    }

    /// Write `buf` in full, or stage it when writes are buffered.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), GuiError> {
        match self.staging.as_mut() {
            None => write_exact(self.channel.as_mut(), buf),
            Some(staging) => {
                staging.append(buf);
                staging.drain(self.channel.as_mut())?;
                Ok(())
            }
        }
    }

    /// Push staged bytes into the ring; the zero-length write of the
    /// event loop. Returns how many bytes went out.
    pub fn flush(&mut self) -> Result<usize, GuiError> {
        match self.staging.as_mut() {
            None => Ok(0),
            Some(staging) => staging.drain(self.channel.as_mut()),
        }
    }

    /// Send the protocol version handshake.
    pub fn send_version(&mut self) -> Result<(), GuiError> {
        trace!(version = PROTOCOL_VERSION, "sending protocol version");
        self.write_all(&PROTOCOL_VERSION.to_le_bytes())
    }

    /// Encode and send one message.
    pub fn send(&mut self, msg: Outbound) -> Result<(), GuiError> {
        trace!(msg_type = %msg.msg_type(), len = msg.body_len(), "send");
        self.scratch.clear();
        self.codec.encode(msg, &mut self.scratch)?;
        let frame = self.scratch.split();
        self.write_all(&frame)
    }

    /// Block until the channel is signalled, an event arrives on `events`,
    /// or `timeout` passes. Staged output is flushed first.
    ///
    /// A channel that closed while waiting is reported as
    /// [`GuiError::ChannelClosed`], even on timeout.
    pub async fn wait<T>(
        &mut self,
        timeout: Duration,
        events: &mut mpsc::Receiver<T>,
    ) -> Result<Wake<T>, GuiError> {
        self.flush()?;

        let wake = tokio::select! {
            res = self.channel.notified() => {
                res?;
                Wake::Channel
            }
            ev = events.recv() => match ev {
                Some(ev) => return Ok(Wake::Event(ev)),
                None => Wake::EventsClosed,
            },
            _ = tokio::time::sleep(timeout) => Wake::Timeout,
        };

        if !self.channel.is_open() {
            return Err(GuiError::ChannelClosed);
        }
        Ok(wake)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("buffered", &self.staging.is_some())
            .field("staged", &self.staged())
            .finish()
    }
}

// ── Exact-size primitives ────────────────────────────────────────

pub(crate) fn closed_or(channel: &mut dyn Channel, err: GuiError) -> GuiError {
    if channel.is_open() {
        err
    } else {
        GuiError::ChannelClosed
    }
}

pub(crate) fn read_exact(channel: &mut dyn Channel, buf: &mut [u8]) -> Result<(), GuiError> {
    let mut done = 0;
    while done < buf.len() {
        match channel.read(&mut buf[done..]) {
            Ok(0) => {
                return Err(closed_or(
                    channel,
                    GuiError::ShortRead {
                        expected: buf.len(),
                        actual: done,
                    },
                ));
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(closed_or(channel, e.into())),
        }
    }
    Ok(())
}

pub(crate) fn write_exact(channel: &mut dyn Channel, buf: &[u8]) -> Result<(), GuiError> {
    let mut done = 0;
    while done < buf.len() {
        match channel.write(&buf[done..]) {
            Ok(0) => {
                return Err(closed_or(
                    channel,
                    io::Error::from(io::ErrorKind::WriteZero).into(),
                ));
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(closed_or(channel, e.into())),
        }
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ShmImage, WireBody};

    fn pair(buffered: bool) -> (Transport, MemoryPeer) {
        let (channel, peer) = MemoryChannel::pair();
        (Transport::new(Box::new(channel), buffered), peer)
    }

    #[test]
    fn read_exact_across_pushes() {
        let (mut t, peer) = pair(false);
        peer.send(&[1, 2]);
        peer.send(&[3, 4, 5]);
        let mut buf = [0u8; 5];
        t.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert_eq!(t.data_ready(), 0);
    }

    #[test]
    fn read_on_closed_channel_reports_closed() {
        let (mut t, peer) = pair(false);
        peer.close();
        let mut buf = [0u8; 4];
        assert!(matches!(
            t.read_exact(&mut buf),
            Err(GuiError::ChannelClosed)
        ));
    }

    #[test]
    fn read_available_never_overreads() {
        let (mut t, peer) = pair(false);
        peer.send(&[9; 3]);
        let mut buf = [0u8; 8];
        assert_eq!(t.read_available(&mut buf).unwrap(), 3);
        assert_eq!(t.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn version_is_four_le_bytes() {
        let (mut t, peer) = pair(false);
        t.send_version().unwrap();
        assert_eq!(&peer.take_output()[..], &[0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn buffered_writes_stage_overflow() {
        let (mut t, peer) = pair(true);
        peer.set_write_limit(Some(10));

        t.send(Outbound::ShmImage(ShmImage::default())).unwrap();
        assert_eq!(peer.output_len(), 10);
        assert_eq!(t.staged(), 12 + ShmImage::SIZE - 10);

        // Nothing drains until the peer consumes.
        assert_eq!(t.flush().unwrap(), 0);
        let first = peer.take_output();
        assert_eq!(t.flush().unwrap(), 10);
        let second = peer.take_output();
        assert_eq!(t.flush().unwrap(), 8);
        assert_eq!(t.staged(), 0);
        assert_eq!(first.len() + second.len() + peer.take_output().len(), 28);
    }

    #[test]
    fn unbuffered_write_to_closed_channel() {
        let (mut t, peer) = pair(false);
        peer.close();
        assert!(matches!(
            t.write_all(&[1, 2, 3]),
            Err(GuiError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn wait_reports_channel_signal() {
        let (mut t, peer) = pair(false);
        let (_tx, mut rx) = mpsc::channel::<u32>(1);
        peer.send(&[0]);
        let wake = t.wait(Duration::from_secs(5), &mut rx).await.unwrap();
        assert_eq!(wake, Wake::Channel);
    }

    #[tokio::test]
    async fn wait_prefers_events_and_times_out() {
        let (mut t, _peer) = pair(false);
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        tx.send(7).await.unwrap();
        assert_eq!(
            t.wait(Duration::from_secs(5), &mut rx).await.unwrap(),
            Wake::Event(7)
        );
        assert_eq!(
            t.wait(Duration::from_millis(10), &mut rx).await.unwrap(),
            Wake::Timeout
        );
        drop(tx);
        assert_eq!(
            t.wait(Duration::from_secs(5), &mut rx).await.unwrap(),
            Wake::EventsClosed
        );
    }

    #[tokio::test]
    async fn wait_detects_close_without_data() {
        let (mut t, peer) = pair(false);
        let (_tx, mut rx) = mpsc::channel::<u32>(1);
        peer.close();
        assert!(matches!(
            t.wait(Duration::from_millis(10), &mut rx).await,
            Err(GuiError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn wait_flushes_staged_output() {
        let (mut t, peer) = pair(true);
        peer.set_write_limit(Some(2));
        t.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(t.staged(), 2);
        let _ = peer.take_output();

        let (_tx, mut rx) = mpsc::channel::<u32>(1);
        let _ = t.wait(Duration::from_millis(1), &mut rx).await.unwrap();
        assert_eq!(t.staged(), 0);
        assert_eq!(&peer.take_output()[..], &[3, 4]);
    }
}
