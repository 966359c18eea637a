//! WebSocket session state machine.
//!
//! # Data Flow
//! ```text
//! connect():  TCP ──► [CONNECT tunnel] ──► upgrade ──► Open
//!                        leftover ──────────► leftover ──► FrameBuffer
//!
//! next_event():  socket ──► FrameBuffer ──► Frame ──► SessionEvent
//! send()/close():  caller ──► mpsc ──► writer task ──► socket
//! ```
//!
//! # Design Decisions
//! - One consumer polls [`Session::next_event`]; events come out in wire order
//! - Writes are queued on an unbounded channel and flushed by a writer task,
//!   so `send`, `ping` and `close` never await. There is no backpressure
//! - State lives in an `AtomicU8` shared with [`SessionSender`] handles, so a
//!   caller can write while another branch of a `select!` is reading
//! - Open to Closing is a single compare-exchange: at most one CLOSE frame
//!   ever leaves the client

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use crate::config::validation::{into_probe_error, validate_request};
use crate::config::{Endpoint, ProxyConfig, Target};
use crate::error::{ProbeError, ProbeResult, TimeoutPhase, WsError};
use crate::net::socket::{read_chunk, PersistentSocket, ReadEvent};
use crate::net::SessionId;
use crate::resilience::with_timeout;
use crate::websocket::buffer::FrameBuffer;
use crate::websocket::frame::{close_payload, create_frame, parse_close_payload, Frame, OpCode};
use crate::websocket::handshake::{self, Handshake, UpgradeRequest};
use crate::websocket::tunnel;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Sent when the peer violates framing.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Reported locally when the connection dropped without a CLOSE frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Default limit for each pre-open phase.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting = 0,
    TunnelPending = 1,
    HandshakePending = 2,
    Open = 3,
    Closing = 4,
    Closed = 5,
}

impl From<u8> for SessionState {
    fn from(val: u8) -> Self {
        match val {
            0 => SessionState::Connecting,
            1 => SessionState::TunnelPending,
            2 => SessionState::HandshakePending,
            3 => SessionState::Open,
            4 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// A data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

/// Something that happened on the session.
#[derive(Debug)]
pub enum SessionEvent {
    /// Handshake accepted; `protocol` is the subprotocol the server picked.
    Open { protocol: Option<String> },
    Message(Message),
    /// The peer pinged; the pong has already been queued.
    Ping(Bytes),
    Pong(Bytes),
    /// Emitted once. `code` is `None` when the CLOSE frame carried no body.
    Close { code: Option<u16>, reason: String },
    Error(ProbeError),
}

/// Parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub path: String,
    /// Raw `Name: value` lines added to the upgrade request.
    pub headers: Vec<String>,
    pub cookie: Option<String>,
    pub subprotocols: Vec<String>,
    pub proxy: Option<ProxyConfig>,
    /// Applied separately to connect, tunnel and handshake.
    pub timeout: Duration,
}

impl SessionConfig {
    pub fn new(target: &Target) -> Self {
        Self {
            endpoint: target.endpoint.clone(),
            path: target.path.clone(),
            headers: Vec::new(),
            cookie: None,
            subprotocols: Vec::new(),
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

enum WriteCommand {
    Frame(Bytes),
    /// Half-close the write side and stop.
    Shutdown,
}

impl std::fmt::Debug for WriteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteCommand::Frame(bytes) => write!(f, "Frame({} bytes)", bytes.len()),
            WriteCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable write handle onto an open session.
#[derive(Debug, Clone)]
pub struct SessionSender {
    id: SessionId,
    state: Arc<AtomicU8>,
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl SessionSender {
    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::Acquire))
    }

    /// Queue a data message. Fails unless the session is open.
    pub fn send(&self, message: Message) -> ProbeResult<()> {
        match &message {
            Message::Text(text) => self.send_frame(OpCode::Text, text.as_bytes()),
            Message::Binary(bytes) => self.send_frame(OpCode::Binary, bytes),
        }
    }

    pub fn send_text(&self, text: &str) -> ProbeResult<()> {
        self.send_frame(OpCode::Text, text.as_bytes())
    }

    pub fn send_binary(&self, bytes: &[u8]) -> ProbeResult<()> {
        self.send_frame(OpCode::Binary, bytes)
    }

    pub fn ping(&self, payload: &[u8]) -> ProbeResult<()> {
        self.send_frame(OpCode::Ping, payload)
    }

    /// Close with 1000 and an empty reason.
    pub fn close(&self) {
        self.close_with(CLOSE_NORMAL, "");
    }

    /// Queue a CLOSE frame and half-close the socket.
    ///
    /// Only the first call on an open session does anything.
    pub fn close_with(&self, code: u16, reason: &str) {
        let swapped = self.state.compare_exchange(
            SessionState::Open as u8,
            SessionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if swapped.is_err() {
            tracing::trace!(session = %self.id, state = ?self.state(), "Close ignored");
            return;
        }

        tracing::debug!(session = %self.id, code, reason = %reason, "Closing session");
        let frame = create_frame(&close_payload(code, reason), OpCode::Close, true);
        if self.tx.send(WriteCommand::Frame(frame)).is_err()
            || self.tx.send(WriteCommand::Shutdown).is_err()
        {
            tracing::debug!(session = %self.id, "Writer already stopped, CLOSE not sent");
        }
    }

    fn send_frame(&self, opcode: OpCode, payload: &[u8]) -> ProbeResult<()> {
        let state = self.state();
        if state != SessionState::Open {
            tracing::debug!(session = %self.id, ?state, ?opcode, "Send rejected");
            return Err(WsError::InvalidState("session is not open").into());
        }
        if self
            .tx
            .send(WriteCommand::Frame(create_frame(payload, opcode, true)))
            .is_err()
        {
            self.state.store(SessionState::Closed as u8, Ordering::Release);
            tracing::debug!(session = %self.id, "Writer stopped, session closed");
            return Err(WsError::InvalidState("writer has stopped").into());
        }
        Ok(())
    }
}

/// Read side of an open connection.
#[derive(Debug)]
struct Inbound {
    reader: OwnedReadHalf,
    write_errors: mpsc::UnboundedReceiver<io::Error>,
}

enum Input {
    Read(ProbeResult<ReadEvent>),
    WriteFailed(io::Error),
}

/// A client WebSocket session.
///
/// ```no_run
/// # async fn demo(target: &wireprobe::config::Target) -> wireprobe::ProbeResult<()> {
/// use wireprobe::websocket::{Session, SessionConfig, SessionEvent};
///
/// let mut session = Session::new(SessionConfig::new(target));
/// session.connect().await?;
/// session.send_text("hello")?;
/// while let Some(event) = session.next_event().await {
///     if let SessionEvent::Message(message) = event {
///         println!("{:?}", message);
///         session.close();
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    state: Arc<AtomicU8>,
    buffer: FrameBuffer,
    inbound: Option<Inbound>,
    sender: Option<SessionSender>,
    pending: VecDeque<SessionEvent>,
    protocol: Option<String>,
    close_reported: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            config,
            state: Arc::new(AtomicU8::new(SessionState::Connecting as u8)),
            buffer: FrameBuffer::new(),
            inbound: None,
            sender: None,
            pending: VecDeque::new(),
            protocol: None,
            close_reported: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subprotocol selected by the server.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Write handle usable while another task awaits [`Session::next_event`].
    /// `None` before the session opens.
    pub fn sender(&self) -> Option<SessionSender> {
        self.sender.clone()
    }

    /// Connect, tunnel if a proxy is configured, and perform the upgrade.
    ///
    /// On failure the socket is dropped and the session is `Closed`.
    pub async fn connect(&mut self) -> ProbeResult<()> {
        let state = self.state();
        if state != SessionState::Connecting {
            tracing::debug!(session = %self.id, ?state, "connect() on a used session");
            return Err(WsError::InvalidState("session already connected").into());
        }

        tracing::info!(
            session = %self.id,
            endpoint = %self.config.endpoint,
            path = %self.config.path,
            proxy = self.config.proxy.as_ref().map(ToString::to_string).as_deref().unwrap_or("-"),
            "Opening WebSocket session"
        );

        let (socket, handshake) = match self.establish().await {
            Ok(established) => established,
            Err(e) => {
                self.set_state(SessionState::Closed);
                tracing::warn!(session = %self.id, error = %e, "WebSocket session failed to open");
                return Err(e);
            }
        };

        let (reader, writer) = socket.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(self.id, writer, rx, error_tx));

        self.buffer = FrameBuffer::with_leftover(&handshake.leftover);
        self.inbound = Some(Inbound {
            reader,
            write_errors: error_rx,
        });
        self.sender = Some(SessionSender {
            id: self.id,
            state: Arc::clone(&self.state),
            tx,
        });
        self.protocol = handshake.protocol.clone();
        self.set_state(SessionState::Open);
        self.pending.push_back(SessionEvent::Open {
            protocol: handshake.protocol,
        });

        tracing::info!(
            session = %self.id,
            protocol = self.protocol.as_deref().unwrap_or("-"),
            "WebSocket session open"
        );
        Ok(())
    }

    async fn establish(&self) -> ProbeResult<(PersistentSocket, Handshake)> {
        validate_request("GET", self.config.timeout.as_millis() as u64)
            .map_err(into_probe_error)?;

        let limit = self.config.timeout;
        let first_hop = match &self.config.proxy {
            Some(proxy) => proxy.endpoint(),
            None => self.config.endpoint.clone(),
        };
        let mut socket = PersistentSocket::open(&first_hop, limit).await?;

        let mut carried = BytesMut::new();
        if self.config.proxy.is_some() {
            self.set_state(SessionState::TunnelPending);
            carried = with_timeout(
                TimeoutPhase::Tunnel,
                limit,
                tunnel::establish(socket.stream_mut(), &self.config.endpoint),
            )
            .await?;
        }

        self.set_state(SessionState::HandshakePending);
        let key = handshake::generate_key();
        let request = UpgradeRequest {
            endpoint: &self.config.endpoint,
            path: &self.config.path,
            key: &key,
            subprotocols: &self.config.subprotocols,
            cookie: self.config.cookie.as_deref(),
            headers: &self.config.headers,
        };
        let handshake = with_timeout(
            TimeoutPhase::Handshake,
            limit,
            handshake::perform(socket.stream_mut(), &request, carried),
        )
        .await?;

        Ok((socket, handshake))
    }

    /// Queue a data message. Fails unless the session is open.
    pub fn send(&self, message: Message) -> ProbeResult<()> {
        self.open_sender()?.send(message)
    }

    pub fn send_text(&self, text: &str) -> ProbeResult<()> {
        self.open_sender()?.send_text(text)
    }

    pub fn send_binary(&self, bytes: &[u8]) -> ProbeResult<()> {
        self.open_sender()?.send_binary(bytes)
    }

    pub fn ping(&self, payload: &[u8]) -> ProbeResult<()> {
        self.open_sender()?.ping(payload)
    }

    /// Close with 1000. No-op unless open.
    pub fn close(&self) {
        self.close_with(CLOSE_NORMAL, "");
    }

    pub fn close_with(&self, code: u16, reason: &str) {
        if let Some(sender) = &self.sender {
            sender.close_with(code, reason);
        }
    }

    fn open_sender(&self) -> ProbeResult<&SessionSender> {
        self.sender
            .as_ref()
            .ok_or_else(|| WsError::InvalidState("session is not open").into())
    }

    /// Wait for the next event. `None` once the session is closed and every
    /// event has been handed out.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.state() == SessionState::Closed {
                if self.inbound.is_none() {
                    return None;
                }
                // A sender saw the writer die before this loop did.
                self.drain_write_errors();
                self.finish(CLOSE_ABNORMAL, "");
                continue;
            }

            match self.buffer.next_frame() {
                Ok(Some(frame)) => {
                    self.dispatch(frame);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    self.protocol_failure(e);
                    continue;
                }
            }

            let Some(inbound) = self.inbound.as_mut() else {
                self.set_state(SessionState::Closed);
                return None;
            };

            let input = tokio::select! {
                read = read_chunk(&mut inbound.reader, self.buffer.bytes_mut()) => Input::Read(read),
                Some(err) = inbound.write_errors.recv() => Input::WriteFailed(err),
            };

            match input {
                Input::Read(Ok(ReadEvent::Data(n))) => {
                    tracing::trace!(session = %self.id, bytes = n, buffered = self.buffer.len(), "Read");
                }
                Input::Read(Ok(ReadEvent::Closed)) => {
                    tracing::debug!(session = %self.id, "Peer closed the connection");
                    self.finish(CLOSE_ABNORMAL, "");
                }
                Input::Read(Err(e)) => {
                    tracing::warn!(session = %self.id, error = %e, "Read failed");
                    self.pending.push_back(SessionEvent::Error(e));
                    self.finish(CLOSE_ABNORMAL, "");
                }
                Input::WriteFailed(e) => {
                    tracing::warn!(session = %self.id, error = %e, "Write failed");
                    self.pending.push_back(SessionEvent::Error(e.into()));
                    self.finish(CLOSE_ABNORMAL, "");
                }
            }
        }
    }

    fn drain_write_errors(&mut self) {
        let Some(inbound) = self.inbound.as_mut() else {
            return;
        };
        while let Ok(e) = inbound.write_errors.try_recv() {
            tracing::warn!(session = %self.id, error = %e, "Write failed");
            self.pending.push_back(SessionEvent::Error(e.into()));
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        tracing::trace!(
            session = %self.id,
            opcode = ?frame.opcode,
            fin = frame.fin,
            len = frame.payload.len(),
            "Frame received"
        );

        if frame.opcode == OpCode::Continuation || (!frame.fin && !frame.opcode.is_control()) {
            tracing::warn!(session = %self.id, opcode = ?frame.opcode, "Fragmented message dropped");
            self.pending.push_back(SessionEvent::Error(
                WsError::Protocol("fragmented messages are not supported".into()).into(),
            ));
            return;
        }

        match frame.opcode {
            OpCode::Text => match std::str::from_utf8(&frame.payload) {
                Ok(text) => {
                    self.pending
                        .push_back(SessionEvent::Message(Message::Text(text.to_string())));
                }
                Err(e) => {
                    // Raw bytes go out as a binary message.
                    tracing::warn!(session = %self.id, error = %e, "TEXT frame is not UTF-8");
                    self.pending.push_back(SessionEvent::Error(
                        WsError::Protocol(format!("text frame is not valid UTF-8: {}", e)).into(),
                    ));
                    self.pending
                        .push_back(SessionEvent::Message(Message::Binary(frame.payload)));
                }
            },
            OpCode::Binary => {
                self.pending
                    .push_back(SessionEvent::Message(Message::Binary(frame.payload)));
            }
            OpCode::Ping => {
                if let Some(sender) = &self.sender {
                    if sender.state() == SessionState::Open {
                        if let Err(e) = sender.send_frame(OpCode::Pong, &frame.payload) {
                            tracing::debug!(session = %self.id, error = %e, "Pong not queued");
                        }
                    }
                }
                self.pending.push_back(SessionEvent::Ping(frame.payload));
            }
            OpCode::Pong => {
                self.pending.push_back(SessionEvent::Pong(frame.payload));
            }
            OpCode::Close => {
                let (code, reason) = parse_close_payload(&frame.payload);
                tracing::debug!(session = %self.id, code = ?code, reason = %reason, "Peer sent CLOSE");
                // Echo the peer's code; a no-op if we already sent our own CLOSE.
                self.close_with(code.unwrap_or(CLOSE_NORMAL), "");
                self.report_close(code, reason);
                self.shut_down();
            }
            OpCode::Continuation => {}
        }
    }

    fn protocol_failure(&mut self, error: ProbeError) {
        tracing::warn!(session = %self.id, error = %error, "Unparseable frame");
        self.pending.push_back(SessionEvent::Error(error));
        self.close_with(CLOSE_PROTOCOL_ERROR, "");
        self.finish(CLOSE_PROTOCOL_ERROR, "");
    }

    /// Local end of the session without a CLOSE from the peer.
    fn finish(&mut self, code: u16, reason: &str) {
        self.report_close(Some(code), reason.to_string());
        self.shut_down();
    }

    fn report_close(&mut self, code: Option<u16>, reason: String) {
        if !self.close_reported {
            self.close_reported = true;
            self.pending.push_back(SessionEvent::Close { code, reason });
        }
    }

    fn shut_down(&mut self) {
        self.set_state(SessionState::Closed);
        self.inbound = None;
        self.buffer = FrameBuffer::new();
        tracing::info!(session = %self.id, "WebSocket session closed");
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

async fn write_loop(
    id: SessionId,
    mut writer: OwnedWriteHalf,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
    errors: mpsc::UnboundedSender<io::Error>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Frame(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    let _ = errors.send(e);
                    break;
                }
            }
            WriteCommand::Shutdown => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!(session = %id, error = %e, "Write-side shutdown failed");
                }
                break;
            }
        }
    }
    tracing::trace!(session = %id, "Writer stopped");
}
