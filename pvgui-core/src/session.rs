//! The session: one owned object driving handshake, window setup and the
//! steady-state event loop over a replaceable channel.
//!
//! [`Session::run`] multiplexes the transport with the graphics
//! backend's [`DisplayEvent`] queue. Disconnect-class errors tear the
//! channel down and restart from the handshake on a new one; other
//! transport errors end the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::{Dispatcher, Inbound, Step};
use crate::display::{DisplayEvent, GraphicsBackend, Rect};
use crate::error::GuiError;
use crate::export::{Exporter, PageResolver};
use crate::input::{InputSink, InputTranslator, Keymap};
use crate::protocol::{
    Configure, CreateWindow, MapInfo, Outbound, PeerConfig, ShmImage, WindowHints, WireBody,
    WmName,
};
use crate::state::SessionState;
use crate::transport::{Connector, Transport, Wake};

// ── SessionConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Peer domain the channel is bound to.
    pub domain: u32,
    pub port: u32,
    /// Stage writes instead of blocking on a full ring.
    pub buffered_writes: bool,
    /// Upper bound on one idle wait, in milliseconds.
    pub wait_timeout_ms: u64,
    pub window_name: String,
    /// Window size announced before the framebuffer has one.
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    /// Drop damage rectangles exactly one row high.
    pub ignore_single_line_damage: bool,
    #[serde(skip)]
    pub keymap: Keymap,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            domain: 0,
            port: 6000,
            buffered_writes: false,
            wait_timeout_ms: 100,
            window_name: "pvgui".to_string(),
            placeholder_width: 640,
            placeholder_height: 480,
            ignore_single_line_damage: true,
            keymap: Keymap::default(),
        }
    }
}

impl SessionConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

// ── WindowGeometry ───────────────────────────────────────────────

/// Last known position and size of the top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowGeometry {
    fn configure(&self) -> Configure {
        Configure {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            override_redirect: 0,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

pub struct Session<C, B, S, R> {
    config: SessionConfig,
    connector: C,
    transport: Transport,
    state: SessionState,
    dispatcher: Dispatcher,
    geometry: WindowGeometry,
    peer: Option<PeerConfig>,
    backend: B,
    input: InputTranslator<S>,
    exporter: Exporter<R>,
    reconnects: u64,
}

impl<C, B, S, R> Session<C, B, S, R>
where
    C: Connector,
    B: GraphicsBackend,
    S: InputSink,
    R: PageResolver,
{
    /// Open the first channel. Failure here is a startup error.
    pub async fn new(
        config: SessionConfig,
        mut connector: C,
        backend: B,
        sink: S,
        resolver: R,
    ) -> Result<Self, GuiError> {
        info!(domain = config.domain, port = config.port, "opening channel");
        let channel = connector.connect(config.domain, config.port).await?;
        let transport = Transport::new(channel, config.buffered_writes);
        let input = InputTranslator::new(sink, config.keymap.clone());
        Ok(Self {
            config,
            connector,
            transport,
            state: SessionState::default(),
            dispatcher: Dispatcher::new(),
            geometry: WindowGeometry::default(),
            peer: None,
            backend,
            input,
            exporter: Exporter::new(resolver),
            reconnects: 0,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }

    /// The configuration block the current peer sent, once received.
    pub fn peer_config(&self) -> Option<PeerConfig> {
        self.peer
    }

    /// Channels replaced since startup.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn input(&self) -> &InputTranslator<S> {
        &self.input
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Send the protocol version if this channel has not seen it yet.
    pub fn start(&mut self) -> Result<(), GuiError> {
        if self.state == SessionState::AwaitingHandshake {
            self.transport.send_version()?;
            self.state.handshake_sent()?;
            info!("version sent, waiting for peer configuration");
        }
        Ok(())
    }

    /// React to channel readiness according to the current state.
    pub fn service(&mut self) -> Result<(), GuiError> {
        match self.state {
            SessionState::AwaitingHandshake => {
                self.start()?;
                self.await_peer_config()
            }
            SessionState::AwaitingPeerConfig => self.await_peer_config(),
            SessionState::Running { .. } => self.dispatch_ready(),
            SessionState::Disconnected => Err(GuiError::ChannelClosed),
        }
    }

    /// Handle one graphics-backend notification.
    pub fn on_display_event(&mut self, event: DisplayEvent) -> Result<(), GuiError> {
        if !self.state.is_running() {
            debug!(?event, state = %self.state, "display event before window setup, ignored");
            return Ok(());
        }
        match event {
            DisplayEvent::Damage(rect) => self.forward_damage(rect),
            DisplayEvent::Resize { width, height } => {
                info!(width, height, "framebuffer resized");
                self.export_framebuffer()
            }
            DisplayEvent::SurfaceReplaced(id) => {
                debug!(id, "framebuffer storage replaced");
                self.export_framebuffer()
            }
        }
    }

    /// Drop the current channel and open a new one on the same endpoint.
    ///
    /// The pressed-key and button state survive; everything tied to the
    /// old channel is discarded.
    pub async fn reconnect(&mut self) -> Result<(), GuiError> {
        self.state.channel_lost();
        self.dispatcher.reset();
        self.geometry = WindowGeometry::default();
        self.peer = None;

        let channel = self
            .connector
            .connect(self.config.domain, self.config.port)
            .await?;
        self.transport = Transport::new(channel, self.config.buffered_writes);
        self.state.restart()?;
        self.reconnects += 1;
        info!(reconnects = self.reconnects, "channel re-established");
        Ok(())
    }

    /// Drive the session until the display event source closes or a
    /// fatal error occurs.
    pub async fn run(&mut self, events: &mut mpsc::Receiver<DisplayEvent>) -> Result<(), GuiError> {
        loop {
            match self.turn(events).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("display backend gone, stopping");
                    return Ok(());
                }
                Err(e) if e.is_disconnect() => {
                    warn!(error = %e, state = %self.state, "peer disconnected, waiting for new connection");
                    self.reconnect().await?;
                }
                Err(e) => {
                    error!(error = %e, "unrecoverable transport error");
                    return Err(e);
                }
            }
        }
    }

    /// One wake-up of the event loop. `Ok(false)` when the event source
    /// is closed.
    async fn turn(&mut self, events: &mut mpsc::Receiver<DisplayEvent>) -> Result<bool, GuiError> {
        if self.state == SessionState::AwaitingHandshake {
            self.start()?;
        }
        match self.transport.wait(self.config.wait_timeout(), events).await? {
            Wake::Event(event) => self.on_display_event(event)?,
            Wake::Channel | Wake::Timeout => self.service()?,
            Wake::EventsClosed => return Ok(false),
        }
        Ok(true)
    }

    // ── Handshake ────────────────────────────────────────────────

    fn await_peer_config(&mut self) -> Result<(), GuiError> {
        if self.transport.data_ready() < PeerConfig::SIZE {
            return Ok(());
        }
        let mut raw = [0u8; PeerConfig::SIZE];
        self.transport.read_exact(&mut raw)?;
        let peer = PeerConfig::decode(&raw)?;
        info!(
            width = peer.width,
            height = peer.height,
            depth = peer.depth,
            mem = peer.mem,
            "got peer configuration, creating window"
        );
        self.peer = Some(peer);

        self.create_window()?;
        self.state.peer_configured()?;
        // Anything that arrived behind the configuration block.
        self.dispatch_ready()
    }

    fn create_window(&mut self) -> Result<(), GuiError> {
        let surface = self.backend.surface();
        let (width, height) = if surface.width == 0 || surface.height == 0 {
            (self.config.placeholder_width, self.config.placeholder_height)
        } else {
            (surface.width, surface.height)
        };
        self.geometry.width = width;
        self.geometry.height = height;

        self.transport.send(Outbound::Create(CreateWindow {
            x: self.geometry.x,
            y: self.geometry.y,
            width,
            height,
            parent: 0,
            override_redirect: 0,
        }))?;
        self.transport.send(Outbound::Map(MapInfo::default()))?;
        self.transport
            .send(Outbound::WmName(WmName::new(&self.config.window_name)))?;
        self.export_framebuffer()
    }

    // ── Framebuffer ──────────────────────────────────────────────

    /// Configure, page list and size hints, in that order.
    fn export_framebuffer(&mut self) -> Result<(), GuiError> {
        let surface = self.backend.surface();
        let sized = surface.width > 0 && surface.height > 0;
        if sized {
            self.geometry.width = surface.width;
            self.geometry.height = surface.height;
        }
        self.transport
            .send(Outbound::Configure(self.geometry.configure()))?;

        if sized {
            match self.exporter.export(&surface) {
                Ok(list) => {
                    info!(
                        pages = list.pages.len(),
                        width = list.width,
                        height = list.height,
                        format = %surface.format,
                        "exporting framebuffer"
                    );
                    self.transport.send(Outbound::MfnDump(list))?;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "framebuffer export abandoned");
                }
                Err(e) => return Err(e),
            }
        } else {
            debug!("framebuffer not sized yet, nothing to export");
        }

        self.transport.send(Outbound::WindowHints(WindowHints::fixed_size(
            self.geometry.width,
            self.geometry.height,
        )))
    }

    fn forward_damage(&mut self, rect: Rect) -> Result<(), GuiError> {
        if self.config.ignore_single_line_damage && rect.height == 1 {
            trace!(?rect, "single-line damage ignored");
            return Ok(());
        }
        let surface = self.backend.surface();
        let rect = self.exporter.refresh(&surface, rect);
        if rect.is_empty() {
            return Ok(());
        }
        self.transport.send(Outbound::ShmImage(ShmImage::from(rect)))
    }

    // ── Steady state ─────────────────────────────────────────────

    fn dispatch_ready(&mut self) -> Result<(), GuiError> {
        loop {
            match self.dispatcher.step(&mut self.transport)? {
                Step::Pending => return Ok(()),
                Step::Discarded { msg_type, len } => {
                    trace!(msg_type, len, "frame discarded");
                }
                Step::Message(msg) => self.handle(msg)?,
            }
        }
    }

    fn handle(&mut self, msg: Inbound) -> Result<(), GuiError> {
        let surface = self.backend.surface();
        let (width, height) = (surface.width, surface.height);

        let result = match msg {
            Inbound::KeyPress(key) => self.input.handle_key(&key),
            Inbound::Button(button) => self.input.translate_button(&button, width, height),
            Inbound::Motion(motion) => {
                self.input.translate_motion(&motion, width, height);
                Ok(())
            }
            Inbound::KeymapNotify(keymap) => {
                self.input.translate_keymap_notify(&keymap.keys);
                Ok(())
            }
            Inbound::Configure(conf) => {
                debug!(
                    x = conf.x,
                    y = conf.y,
                    width = conf.width,
                    height = conf.height,
                    was_x = self.geometry.x,
                    was_y = self.geometry.y,
                    "configure from peer"
                );
                self.geometry = WindowGeometry {
                    x: conf.x,
                    y: conf.y,
                    width: conf.width,
                    height: conf.height,
                };
                Ok(())
            }
        };

        match result {
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "input event dropped");
                Ok(())
            }
            other => other,
        }
    }
}

impl<C, B, S, R> std::fmt::Debug for Session<C, B, S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("geometry", &self.geometry)
            .field("transport", &self.transport)
            .field("reconnects", &self.reconnects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Frame, GuiCodec};
    use crate::display::{PixelFormat, Surface};
    use crate::flags::{LedState, PointerButtons};
    use crate::header::MessageHeader;
    use crate::message::MsgType;
    use crate::protocol::{KeyPress, PageId};
    use crate::transport::memory::Accepted;
    use crate::transport::{MemoryConnector, MemoryPeer};
    use bytes::BytesMut;
    use std::sync::mpsc as std_mpsc;
    use tokio_util::codec::Decoder;

    struct TestBackend {
        data: Vec<u8>,
        width: u32,
        height: u32,
    }

    impl GraphicsBackend for TestBackend {
        fn surface(&self) -> Surface<'_> {
            Surface {
                id: 1,
                width: self.width,
                height: self.height,
                stride: self.width as usize * 4,
                format: PixelFormat::Xrgb8888,
                data: &self.data,
            }
        }
    }

    #[derive(Default)]
    struct Sink {
        codes: Vec<u8>,
        pointer: Vec<(i32, i32, i32, PointerButtons)>,
    }

    impl InputSink for Sink {
        fn inject_keycode(&mut self, code: u8) {
            self.codes.push(code);
        }
        fn inject_pointer(&mut self, x: i32, y: i32, wheel: i32, buttons: PointerButtons) {
            self.pointer.push((x, y, wheel, buttons));
        }
        fn lock_led_state(&self) -> LedState {
            LedState::empty()
        }
        fn is_pointer_absolute(&self) -> bool {
            true
        }
    }

    struct FrameNumbers;

    impl PageResolver for FrameNumbers {
        fn resolve_page(&mut self, addr: usize) -> Result<PageId, GuiError> {
            Ok((addr >> 12) as PageId)
        }
    }

    type TestSession = Session<MemoryConnector, TestBackend, Sink, FrameNumbers>;

    async fn session(
        width: u32,
        height: u32,
    ) -> (TestSession, MemoryPeer, std_mpsc::Receiver<Accepted>) {
        let (connector, accepted) = MemoryConnector::new();
        let config = SessionConfig {
            wait_timeout_ms: 5,
            window_name: "test-vm".into(),
            keymap: Keymap::evdev().with_overrides([(65, 0x1E)]),
            ..Default::default()
        };
        let backend = TestBackend {
            data: vec![0; (width * height * 4) as usize],
            width,
            height,
        };
        let s = Session::new(config, connector, backend, Sink::default(), FrameNumbers)
            .await
            .unwrap();
        let peer = accepted.recv().unwrap().peer;
        (s, peer, accepted)
    }

    fn frames(peer: &MemoryPeer) -> Vec<Frame> {
        let mut buf = BytesMut::from(&peer.take_output()[..]);
        let mut codec = GuiCodec::new();
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(frame);
        }
        assert!(buf.is_empty(), "trailing partial frame");
        out
    }

    fn types(frames: &[Frame]) -> Vec<MsgType> {
        frames
            .iter()
            .map(|f| MsgType::try_from(f.header.msg_type).unwrap())
            .collect()
    }

    fn send_frame(peer: &MemoryPeer, msg_type: MsgType, body: &[u8]) {
        peer.send(&MessageHeader::new(msg_type as u32, 1, body.len() as u32).encode());
        peer.send(body);
    }

    fn xconf() -> Vec<u8> {
        PeerConfig {
            width: 1920,
            height: 1080,
            depth: 24,
            mem: 8192,
        }
        .encode()
    }

    /// Session past the handshake with its setup output consumed.
    async fn running(
        width: u32,
        height: u32,
    ) -> (TestSession, MemoryPeer, std_mpsc::Receiver<Accepted>) {
        let (mut s, peer, accepted) = session(width, height).await;
        s.start().unwrap();
        peer.send(&xconf());
        s.service().unwrap();
        assert!(s.state().is_running());
        let _ = peer.take_output();
        (s, peer, accepted)
    }

    #[tokio::test]
    async fn version_is_the_first_output() {
        let (mut s, peer, _accepted) = session(64, 64).await;
        assert_eq!(peer.output_len(), 0);
        s.start().unwrap();
        assert_eq!(&peer.take_output()[..], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(*s.state(), SessionState::AwaitingPeerConfig);

        // Idempotent per channel.
        s.start().unwrap();
        assert_eq!(peer.output_len(), 0);
    }

    #[tokio::test]
    async fn not_running_until_peer_config_arrives() {
        let (mut s, peer, _accepted) = session(64, 64).await;
        s.start().unwrap();
        peer.send(&xconf()[..10]);
        s.service().unwrap();
        assert_eq!(*s.state(), SessionState::AwaitingPeerConfig);
        peer.send(&xconf()[10..]);
        s.service().unwrap();
        assert!(s.state().is_running());
        assert_eq!(s.peer_config().unwrap().width, 1920);
    }

    #[tokio::test]
    async fn window_setup_sequence() {
        let (mut s, peer, _accepted) = session(64, 32).await;
        s.start().unwrap();
        let _ = peer.take_output();
        peer.send(&xconf());
        s.service().unwrap();

        let out = frames(&peer);
        assert_eq!(
            types(&out),
            vec![
                MsgType::Create,
                MsgType::Map,
                MsgType::WmName,
                MsgType::Configure,
                MsgType::MfnDump,
                MsgType::WindowHints,
            ]
        );
        match out[0].outbound().unwrap() {
            Outbound::Create(c) => assert_eq!((c.width, c.height), (64, 32)),
            other => panic!("unexpected {other:?}"),
        }
        match out[2].outbound().unwrap() {
            Outbound::WmName(name) => assert_eq!(name.name(), "test-vm"),
            other => panic!("unexpected {other:?}"),
        }
        match out[4].outbound().unwrap() {
            Outbound::MfnDump(list) => {
                assert_eq!((list.width, list.height, list.bpp), (64, 32, 24));
                let (_, count) = crate::export::page_span(
                    s.backend().surface().base_addr(),
                    64 * 32 * 4,
                );
                assert_eq!(list.pages.len(), count);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            out[5].outbound().unwrap(),
            Outbound::WindowHints(WindowHints::fixed_size(64, 32))
        );
        for frame in &out {
            assert_eq!(frame.header.window, 1);
        }
    }

    #[tokio::test]
    async fn placeholder_size_before_framebuffer_is_sized() {
        let (mut s, peer, _accepted) = session(0, 0).await;
        s.start().unwrap();
        let _ = peer.take_output();
        peer.send(&xconf());
        s.service().unwrap();

        let out = frames(&peer);
        assert!(!types(&out).contains(&MsgType::MfnDump));
        match out[0].outbound().unwrap() {
            Outbound::Create(c) => assert_eq!((c.width, c.height), (640, 480)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.geometry().width, 640);
    }

    #[tokio::test]
    async fn configure_updates_geometry_silently() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        let conf = Configure {
            x: 10,
            y: 20,
            width: 800,
            height: 600,
            override_redirect: 0,
        };
        send_frame(&peer, MsgType::Configure, &conf.encode());
        s.service().unwrap();

        assert_eq!(
            s.geometry(),
            WindowGeometry {
                x: 10,
                y: 20,
                width: 800,
                height: 600
            }
        );
        assert_eq!(peer.output_len(), 0);
    }

    #[tokio::test]
    async fn key_event_reaches_sink() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        let key = KeyPress {
            ty: 2,
            x: 0,
            y: 0,
            state: 0,
            keycode: 65,
        };
        send_frame(&peer, MsgType::KeyPress, &key.encode());
        s.service().unwrap();
        assert_eq!(s.input().sink().codes, vec![0x1E]);
    }

    #[tokio::test]
    async fn unmapped_key_does_not_end_session() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        let key = KeyPress {
            ty: 2,
            x: 0,
            y: 0,
            state: 0,
            keycode: 250,
        };
        send_frame(&peer, MsgType::KeyPress, &key.encode());
        s.service().unwrap();
        assert!(s.input().sink().codes.is_empty());
        assert!(s.state().is_running());
    }

    #[tokio::test]
    async fn ignored_types_are_skipped_between_events() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        send_frame(&peer, MsgType::ClipboardData, b"clipboard contents");
        send_frame(
            &peer,
            MsgType::Motion,
            &crate::protocol::Motion {
                x: 63,
                y: 0,
                state: 0,
                is_hint: 0,
            }
            .encode(),
        );
        s.service().unwrap();
        assert_eq!(
            s.input().sink().pointer,
            vec![(0x7FFF, 0, 0, PointerButtons::empty())]
        );
        assert_eq!(peer.pending_input(), 0);
    }

    #[tokio::test]
    async fn length_mismatch_requests_reconnect() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        send_frame(&peer, MsgType::Motion, &[0; 20]);
        let err = s.service().unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn damage_is_forwarded_when_running() {
        let (mut s, peer, _accepted) = session(64, 64).await;
        s.on_display_event(DisplayEvent::Damage(Rect::new(0, 0, 8, 8)))
            .unwrap();
        assert_eq!(peer.output_len(), 0);

        let (mut s, peer, _accepted) = running(64, 64).await;
        s.on_display_event(DisplayEvent::Damage(Rect::new(4, 4, 100, 8)))
            .unwrap();
        s.on_display_event(DisplayEvent::Damage(Rect::new(0, 0, 64, 1)))
            .unwrap();
        let out = frames(&peer);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].outbound().unwrap(),
            Outbound::ShmImage(ShmImage {
                x: 4,
                y: 4,
                width: 60,
                height: 8
            })
        );
    }

    #[tokio::test]
    async fn resize_reexports_in_order() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        s.backend_mut().width = 32;
        s.backend_mut().height = 16;
        s.on_display_event(DisplayEvent::Resize {
            width: 32,
            height: 16,
        })
        .unwrap();

        let out = frames(&peer);
        assert_eq!(
            types(&out),
            vec![MsgType::Configure, MsgType::MfnDump, MsgType::WindowHints]
        );
        match out[0].outbound().unwrap() {
            Outbound::Configure(c) => assert_eq!((c.width, c.height), (32, 16)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn replaced_surface_is_reexported() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        s.backend_mut().data = vec![0xFF; 64 * 64 * 4];
        s.on_display_event(DisplayEvent::SurfaceReplaced(2)).unwrap();

        let out = frames(&peer);
        assert_eq!(
            types(&out),
            vec![MsgType::Configure, MsgType::MfnDump, MsgType::WindowHints]
        );
        match out[1].outbound().unwrap() {
            Outbound::MfnDump(list) => {
                let (offset, count) =
                    crate::export::page_span(s.backend().surface().base_addr(), 64 * 64 * 4);
                assert_eq!(list.offset as usize, offset);
                assert_eq!(list.pages.len(), count);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(s.state().is_running());
    }

    struct NoFrames;

    impl PageResolver for NoFrames {
        fn resolve_page(&mut self, addr: usize) -> Result<PageId, GuiError> {
            Err(GuiError::PageResolve {
                addr,
                reason: "frame number hidden".into(),
            })
        }
    }

    #[tokio::test]
    async fn failed_page_lookup_skips_only_the_page_list() {
        let (connector, accepted) = MemoryConnector::new();
        let backend = TestBackend {
            data: vec![0; 32 * 16 * 4],
            width: 32,
            height: 16,
        };
        let mut s = Session::new(
            SessionConfig::default(),
            connector,
            backend,
            Sink::default(),
            NoFrames,
        )
        .await
        .unwrap();
        let peer = accepted.recv().unwrap().peer;
        s.start().unwrap();
        let _ = peer.take_output();
        peer.send(&xconf());
        s.service().unwrap();

        let out = frames(&peer);
        assert_eq!(
            types(&out),
            vec![
                MsgType::Create,
                MsgType::Map,
                MsgType::WmName,
                MsgType::Configure,
                MsgType::WindowHints,
            ]
        );
        assert!(s.state().is_running());

        // A later resize hits the same failure and still keeps running.
        s.on_display_event(DisplayEvent::Resize {
            width: 32,
            height: 16,
        })
        .unwrap();
        assert_eq!(
            types(&frames(&peer)),
            vec![MsgType::Configure, MsgType::WindowHints]
        );
        assert!(s.state().is_running());
    }

    #[tokio::test]
    async fn reconnect_uses_a_fresh_channel() {
        let (mut s, old, accepted) = running(64, 64).await;
        // Leave a frame half received on the old channel.
        old.send(&MessageHeader::new(MsgType::KeyPress as u32, 1, 20).encode());
        old.send(&[0; 4]);
        s.service().unwrap();
        old.close();

        s.reconnect().await.unwrap();
        assert_eq!(*s.state(), SessionState::AwaitingHandshake);
        assert_eq!(s.reconnects(), 1);
        assert_eq!(s.geometry(), WindowGeometry::default());

        let fresh = accepted.recv().unwrap().peer;
        s.start().unwrap();
        assert_eq!(&fresh.take_output()[..], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(old.output_len(), 0);
    }

    #[tokio::test]
    async fn pressed_keys_survive_reconnect() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        let key = KeyPress {
            ty: 2,
            x: 0,
            y: 0,
            state: 0,
            keycode: 38,
        };
        send_frame(&peer, MsgType::KeyPress, &key.encode());
        s.service().unwrap();
        peer.close();
        s.reconnect().await.unwrap();
        assert!(s.input().keys().get(38));
    }

    async fn next_peer(accepted: &std_mpsc::Receiver<Accepted>) -> MemoryPeer {
        for _ in 0..500 {
            if let Ok(a) = accepted.try_recv() {
                return a.peer;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("no connection attempt");
    }

    async fn output_at_least(peer: &MemoryPeer, n: usize) {
        for _ in 0..500 {
            if peer.output_len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {n} output bytes, have {}", peer.output_len());
    }

    #[tokio::test]
    async fn run_survives_peer_disconnect() {
        let (mut s, first, accepted) = session(64, 64).await;
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(async move {
            let result = s.run(&mut rx).await;
            (s, result)
        });

        output_at_least(&first, 4).await;
        assert_eq!(&first.take_output()[..], &[0x00, 0x00, 0x01, 0x00]);
        first.send(&xconf());
        output_at_least(&first, 1).await;

        first.close();
        let second = next_peer(&accepted).await;
        output_at_least(&second, 4).await;
        assert_eq!(&second.take_output()[..4], &[0x00, 0x00, 0x01, 0x00]);

        drop(tx);
        let (s, result) = task.await.unwrap();
        result.unwrap();
        assert_eq!(s.reconnects(), 1);
        assert_eq!(*s.state(), SessionState::AwaitingPeerConfig);
    }

    #[tokio::test]
    async fn run_forwards_backend_events() {
        let (mut s, peer, _accepted) = running(64, 64).await;
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(DisplayEvent::Damage(Rect::new(0, 0, 2, 2)))
            .await
            .unwrap();
        drop(tx);
        s.run(&mut rx).await.unwrap();

        let out = frames(&peer);
        assert_eq!(types(&out), vec![MsgType::ShmImage]);
    }
}
