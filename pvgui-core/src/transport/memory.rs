//! In-process channel pair.
//!
//! [`MemoryChannel`] is the agent end and implements [`Channel`];
//! [`MemoryPeer`] is the daemon end, driven directly by the caller. The
//! agent end never blocks: reading from an empty, open channel fails with
//! `WouldBlock`, and writes beyond the configured limit are cut short.

use std::io;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::sync::Notify;

use crate::error::GuiError;
use crate::transport::{Channel, Connector};

#[derive(Debug)]
struct State {
    to_agent: BytesMut,
    from_agent: BytesMut,
    open: bool,
    write_limit: Option<usize>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── MemoryChannel ────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryChannel {
    shared: Arc<Shared>,
}

impl MemoryChannel {
    /// A connected (agent, peer) pair.
    pub fn pair() -> (MemoryChannel, MemoryPeer) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                to_agent: BytesMut::new(),
                from_agent: BytesMut::new(),
                open: true,
                write_limit: None,
            }),
            notify: Notify::new(),
        });
        (
            MemoryChannel {
                shared: Arc::clone(&shared),
            },
            MemoryPeer { shared },
        )
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn is_open(&mut self) -> bool {
        self.shared.lock().open
    }

    fn data_ready(&mut self) -> usize {
        self.shared.lock().to_agent.len()
    }

    fn buffer_space(&mut self) -> usize {
        let state = self.shared.lock();
        if !state.open {
            return 0;
        }
        match state.write_limit {
            Some(limit) => limit.saturating_sub(state.from_agent.len()),
            None => usize::MAX,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        if state.to_agent.is_empty() {
            if state.open {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            return Ok(0);
        }
        let n = buf.len().min(state.to_agent.len());
        state.to_agent.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        if !state.open {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let space = match state.write_limit {
            Some(limit) => limit.saturating_sub(state.from_agent.len()),
            None => buf.len(),
        };
        if space == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(space);
        state.from_agent.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    async fn notified(&mut self) -> io::Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.shared.notify.notified().await;
        Ok(())
    }
}

// ── MemoryPeer ───────────────────────────────────────────────────

/// Daemon side of a [`MemoryChannel`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Arc<Shared>,
}

impl MemoryPeer {
    /// Queue bytes for the agent and signal the channel.
    pub fn send(&self, data: &[u8]) {
        self.shared.lock().to_agent.extend_from_slice(data);
        self.shared.notify.notify_one();
    }

    /// Everything the agent has written so far, removing it from the ring.
    pub fn take_output(&self) -> BytesMut {
        let out = self.shared.lock().from_agent.split();
        self.shared.notify.notify_one();
        out
    }

    /// Bytes written by the agent and not yet taken.
    pub fn output_len(&self) -> usize {
        self.shared.lock().from_agent.len()
    }

    /// Bytes sent to the agent and not yet read.
    pub fn pending_input(&self) -> usize {
        self.shared.lock().to_agent.len()
    }

    /// Cap how many untaken bytes the agent may have in flight.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.shared.lock().write_limit = limit;
    }

    pub fn close(&self) {
        self.shared.lock().open = false;
        self.shared.notify.notify_one();
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }
}

// ── MemoryConnector ──────────────────────────────────────────────

/// A peer handed out by [`MemoryConnector`], tagged with its endpoint.
#[derive(Debug)]
pub struct Accepted {
    pub domain: u32,
    pub port: u32,
    pub peer: MemoryPeer,
}

/// Connector creating a fresh [`MemoryChannel`] pair per call.
#[derive(Debug)]
pub struct MemoryConnector {
    peers: std_mpsc::Sender<Accepted>,
    connects: usize,
}

impl MemoryConnector {
    /// The connector and the queue its peer ends are delivered on.
    pub fn new() -> (Self, std_mpsc::Receiver<Accepted>) {
        let (tx, rx) = std_mpsc::channel();
        (
            Self {
                peers: tx,
                connects: 0,
            },
            rx,
        )
    }

    /// Number of channels created so far.
    pub fn connects(&self) -> usize {
        self.connects
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&mut self, domain: u32, port: u32) -> Result<Box<dyn Channel>, GuiError> {
        let (channel, peer) = MemoryChannel::pair();
        self.peers
            .send(Accepted { domain, port, peer })
            .map_err(|_| GuiError::Other("memory connector receiver dropped".into()))?;
        self.connects += 1;
        Ok(Box::new(channel))
    }
}
