//! Output staging for channels that must never block on write.
//!
//! Append-only and unbounded: the producer is framebuffer damage, paced by
//! the display refresh, so backlog is absorbed in memory while the ring
//! drains at whatever rate the peer reads.

use std::io;

use bytes::{Buf, BytesMut};

use crate::error::GuiError;
use crate::transport::{Channel, closed_or};

#[derive(Debug, Default)]
pub struct StagingBuffer {
    data: BytesMut,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, buf: &[u8]) {
        self.data.extend_from_slice(buf);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move as many leading bytes as the channel accepts without blocking.
    /// Returns how many were flushed.
    ///
    /// Stops at the advertised buffer space or at the first `WouldBlock`,
    /// whichever comes first; the rest stays staged.
    pub fn drain(&mut self, channel: &mut dyn Channel) -> Result<usize, GuiError> {
        let budget = channel.buffer_space().min(self.data.len());
        let mut flushed = 0;
        while flushed < budget {
            match channel.try_write(&self.data[..budget - flushed]) {
                Ok(0) => {
                    return Err(closed_or(
                        channel,
                        io::Error::from(io::ErrorKind::WriteZero).into(),
                    ));
                }
                Ok(n) => {
                    self.data.advance(n);
                    flushed += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(closed_or(channel, e.into())),
            }
        }
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryChannel;

    #[test]
    fn drain_respects_buffer_space() {
        let (mut channel, peer) = MemoryChannel::pair();
        peer.set_write_limit(Some(3));

        let mut staging = StagingBuffer::new();
        staging.append(b"hello");
        assert_eq!(staging.drain(&mut channel).unwrap(), 3);
        assert_eq!(staging.len(), 2);
        assert_eq!(staging.drain(&mut channel).unwrap(), 0);

        assert_eq!(&peer.take_output()[..], b"hel");
        assert_eq!(staging.drain(&mut channel).unwrap(), 2);
        assert!(staging.is_empty());
        assert_eq!(&peer.take_output()[..], b"lo");
    }

    #[test]
    fn order_is_preserved_across_appends() {
        let (mut channel, peer) = MemoryChannel::pair();
        peer.set_write_limit(Some(1));

        let mut staging = StagingBuffer::new();
        staging.append(b"ab");
        staging.drain(&mut channel).unwrap();
        staging.append(b"cd");

        let mut seen = Vec::new();
        seen.extend_from_slice(&peer.take_output());
        while !staging.is_empty() {
            staging.drain(&mut channel).unwrap();
            seen.extend_from_slice(&peer.take_output());
        }
        assert_eq!(seen, b"abcd");
    }

    /// Claims ring space it cannot always take, like a socket whose
    /// kernel buffer filled up behind its back.
    struct Stalling {
        accepts: usize,
        taken: Vec<u8>,
    }

    #[async_trait::async_trait]
    impl Channel for Stalling {
        fn is_open(&mut self) -> bool {
            true
        }
        fn data_ready(&mut self) -> usize {
            0
        }
        fn buffer_space(&mut self) -> usize {
            1024
        }
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            panic!("drain must not use the blocking write");
        }
        fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accepts == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.accepts).min(3);
            self.accepts -= n;
            self.taken.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        async fn notified(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn drain_stops_at_would_block() {
        let mut channel = Stalling {
            accepts: 7,
            taken: Vec::new(),
        };
        let mut staging = StagingBuffer::new();
        staging.append(b"0123456789");

        assert_eq!(staging.drain(&mut channel).unwrap(), 7);
        assert_eq!(staging.len(), 3);
        assert_eq!(channel.taken, b"0123456");
        assert_eq!(staging.drain(&mut channel).unwrap(), 0);

        channel.accepts = 10;
        assert_eq!(staging.drain(&mut channel).unwrap(), 3);
        assert!(staging.is_empty());
        assert_eq!(channel.taken, b"0123456789");
    }

    #[test]
    fn empty_drain_is_a_no_op() {
        let (mut channel, peer) = MemoryChannel::pair();
        let mut staging = StagingBuffer::new();
        assert_eq!(staging.drain(&mut channel).unwrap(), 0);
        assert_eq!(peer.output_len(), 0);
    }
}
