//! Unix-socket stand-in for the inter-domain channel.
//!
//! The agent is the serving end: [`UnixConnector::connect`] binds
//! `<socket_dir>/pvgui-<domain>-<port>.sock` and waits, without holding
//! a runtime thread, until the daemon side connects, the same way a
//! channel server waits for its client.
//!
//! Sockets have no "bytes ready" query, so [`UnixChannel`] drains the
//! socket into a local inbox whenever it is polled and answers
//! `data_ready` from there.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::unix::AsyncFd;
use tokio::net::UnixListener;
use tracing::{debug, info};

use pvgui_core::{Channel, Connector, GuiError};

const READ_CHUNK: usize = 4096;

// ── UnixChannel ──────────────────────────────────────────────────

pub struct UnixChannel {
    stream: AsyncFd<UnixStream>,
    inbox: Vec<u8>,
    ring_size: usize,
    open: bool,
}

impl UnixChannel {
    /// Wrap a connected stream. Must be called inside a tokio runtime.
    pub fn new(stream: UnixStream, ring_size: usize) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: AsyncFd::new(stream)?,
            inbox: Vec::new(),
            ring_size: ring_size.max(1),
            open: true,
        })
    }

    /// Move everything the socket holds into the inbox without blocking.
    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.open {
            match self.stream.get_ref().read(&mut chunk) {
                Ok(0) => {
                    debug!("peer closed the socket");
                    self.open = false;
                }
                Ok(n) => self.inbox.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => self.open = false,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Run `op` on the socket in blocking mode.
    fn blocking<T>(&self, op: impl FnOnce(&UnixStream) -> io::Result<T>) -> io::Result<T> {
        let stream = self.stream.get_ref();
        stream.set_nonblocking(false)?;
        let result = op(stream);
        stream.set_nonblocking(true)?;
        result
    }
}

#[async_trait]
impl Channel for UnixChannel {
    fn is_open(&mut self) -> bool {
        self.open
    }

    fn data_ready(&mut self) -> usize {
        if let Err(e) = self.fill() {
            debug!(error = %e, "socket poll failed");
            self.open = false;
        }
        self.inbox.len()
    }

    fn buffer_space(&mut self) -> usize {
        if self.open { self.ring_size } else { 0 }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inbox.is_empty() {
            self.fill()?;
        }
        if self.inbox.is_empty() {
            if !self.open {
                return Ok(0);
            }
            let n = self.blocking(|mut s| s.read(buf))?;
            if n == 0 {
                self.open = false;
            }
            return Ok(n);
        }
        let n = buf.len().min(self.inbox.len());
        buf[..n].copy_from_slice(&self.inbox[..n]);
        self.inbox.drain(..n);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.try_write(buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.blocking(|mut s| s.write(buf))
            }
            other => other,
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.stream.get_ref().write(buf)
    }

    async fn notified(&mut self) -> io::Result<()> {
        if !self.open {
            return Ok(());
        }
        loop {
            let mut guard = self.stream.readable().await?;
            let mut chunk = [0u8; READ_CHUNK];
            match guard.try_io(|inner| inner.get_ref().read(&mut chunk)) {
                Ok(Ok(0)) => {
                    self.open = false;
                    return Ok(());
                }
                Ok(Ok(n)) => {
                    self.inbox.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionReset => {
                    self.open = false;
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }
}

impl std::fmt::Debug for UnixChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixChannel")
            .field("open", &self.open)
            .field("inbox", &self.inbox.len())
            .field("ring_size", &self.ring_size)
            .finish()
    }
}

// ── UnixConnector ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UnixConnector {
    socket_dir: PathBuf,
    ring_size: usize,
}

impl UnixConnector {
    pub fn new(socket_dir: impl Into<PathBuf>, ring_size: usize) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            ring_size,
        }
    }

    /// Where the socket for `(domain, port)` lives.
    pub fn socket_path(&self, domain: u32, port: u32) -> PathBuf {
        socket_path(&self.socket_dir, domain, port)
    }
}

pub fn socket_path(dir: &Path, domain: u32, port: u32) -> PathBuf {
    dir.join(format!("pvgui-{domain}-{port}.sock"))
}

#[async_trait]
impl Connector for UnixConnector {
    async fn connect(&mut self, domain: u32, port: u32) -> Result<Box<dyn Channel>, GuiError> {
        let path = self.socket_path(domain, port);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("removed stale socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path)?;
        info!("waiting for peer on {}", path.display());
        let (stream, _) = listener.accept().await?;
        drop(listener);
        // One peer per channel; later clients get ECONNREFUSED.
        std::fs::remove_file(&path)?;

        info!(domain, port, "peer connected");
        let stream = stream.into_std()?;
        Ok(Box::new(UnixChannel::new(stream, self.ring_size)?))
    }
}

// ── Tests ────────────────────────────────────────────────────────
