//! The connection state machine: send queue, reply correlation, and the
//! reconnect loop.
//!
//! Driven by a single actor task ([`Socket::spawn`]), fed by an internal
//! instruction channel, mirroring `RequestManager::spawn`'s
//! `select!`-over-instructions loop from the ethers-rs provider crate:
//! all Socket state is mutated inside that one task, so no two handlers
//! ever run concurrently (see the crate's concurrency notes).
//! [`SocketHandle`] is the cheaply-clonable, message-passing front for it.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{is_recoverable_close, ExecuteError, InteractiveError, MessageParseError, PreflightError};
use crate::message::{Frame, Method, MethodFrame, Push};
use crate::options::{SocketOptions, QUEUED_FALLBACK_TIMEOUT};
use crate::packet::{Packet, PacketState};
use crate::preflight::preflight;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of a [`Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// No stream, no pending connection attempt.
    Idle,
    /// A connection attempt (preflight + upgrade handshake) is underway.
    Connecting,
    /// The stream is open and frames may be written.
    Connected,
    /// A user-requested close is underway; the stream is being torn down.
    Closing,
    /// A reconnect delay is pending, scheduled by the reconnect policy.
    Reconnecting,
    /// A close was requested while `Closing`; the new connection attempt
    /// is deferred until the in-flight close completes.
    Refreshing,
}

/// An error surfaced on the Socket's event stream, distinct from an
/// [`ExecuteError`] rejecting a single in-flight request.
#[derive(Debug, Clone)]
pub enum SocketError {
    /// A non-recoverable close code, or an `error` field on a Reply whose
    /// packet had already settled (e.g. after a timeout).
    Interactive(InteractiveError),
    /// An inbound frame could not be parsed.
    MessageParse(MessageParseError),
    /// The preflight probe failed; the connection attempt was abandoned.
    Preflight(PreflightError),
}

/// Events observable on a [`Socket`] from the outside.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The stream finished the upgrade handshake; queued packets drain.
    Open,
    /// The stream closed with the given code/reason.
    Close {
        /// Close code reported by the peer (or synthesized locally).
        code: u16,
        /// Close reason, if any.
        reason: String,
    },
    /// A terminal or frame-level error.
    Error(SocketError),
    /// A server-initiated method call.
    Push(Push),
}

enum Instruction {
    Connect,
    Close,
    Execute {
        method: String,
        params: Value,
        discard: bool,
        timeout: Option<Duration>,
        reply_tx: oneshot::Sender<Result<Value, ExecuteError>>,
    },
    Cancel(u32),
    GetState(oneshot::Sender<SocketState>),
    QueueSize(oneshot::Sender<usize>),
    /// Self-signal sent once a client-initiated close's stream teardown
    /// finishes, so it's driven through the same path as a peer-initiated
    /// close and the intervening window lets a racing `Connect` land on
    /// `Refreshing` (spec §4.4) instead of being swallowed synchronously.
    StreamClosed { code: u16, reason: String },
}

/// Outstanding request bookkeeping, one per in-flight [`Packet`].
struct PendingEntry {
    packet: Packet,
    /// `None` once the future has settled (reply, cancel, or timeout);
    /// the entry itself is only removed from the queue by a reply,
    /// a cancel, or the Socket closing (see the timeout boundary case in
    /// the crate's testable-properties notes).
    reply_tx: Option<oneshot::Sender<Result<Value, ExecuteError>>>,
    /// Queued-while-disconnected fallback deadline, or the per-packet
    /// reply deadline once Sending.
    deadline: Instant,
}

/// A cheaply-clonable handle to a running [`Socket`] actor.
#[derive(Clone)]
pub struct SocketHandle {
    instructions: mpsc::UnboundedSender<Instruction>,
    events: broadcast::Sender<SocketEvent>,
}

impl SocketHandle {
    /// Subscribes to the Socket's event stream. Each subscriber gets its
    /// own queue; slow subscribers may lag (see [`broadcast::Receiver`]).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.events.subscribe()
    }

    /// Requests a connection attempt. No-op if already connecting,
    /// connected, or reconnecting.
    pub fn connect(&self) {
        let _ = self.instructions.send(Instruction::Connect);
    }

    /// Requests a clean close. Queued and in-flight packets are
    /// cancelled.
    pub fn close(&self) {
        let _ = self.instructions.send(Instruction::Close);
    }

    /// Current connection state.
    pub async fn state(&self) -> SocketState {
        let (tx, rx) = oneshot::channel();
        if self.instructions.send(Instruction::GetState(tx)).is_err() {
            return SocketState::Idle;
        }
        rx.await.unwrap_or(SocketState::Idle)
    }

    /// Number of packets currently tracked (queued, sending, or settled
    /// but not yet swept — see the timeout boundary case).
    pub async fn queue_size(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.instructions.send(Instruction::QueueSize(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Cancels the in-flight request with the given Method id, if any.
    pub fn cancel(&self, id: u32) {
        let _ = self.instructions.send(Instruction::Cancel(id));
    }

    /// Sends `method(params)`, resolving with the Reply's `result`, or
    /// rejecting per the error taxonomy (Cancelled, Timeout, or a server
    /// error). Uses the Socket's default reply timeout.
    ///
    /// # Errors
    ///
    /// See [`ExecuteError`].
    pub async fn execute(
        &self,
        method: impl Into<String>,
        params: Value,
        discard: bool,
    ) -> Result<Value, ExecuteError> {
        self.execute_with_timeout(method, params, discard, None).await
    }

    /// As [`SocketHandle::execute`], with a per-call timeout override.
    ///
    /// # Errors
    ///
    /// See [`ExecuteError`].
    pub async fn execute_with_timeout(
        &self,
        method: impl Into<String>,
        params: Value,
        discard: bool,
        timeout: Option<Duration>,
    ) -> Result<Value, ExecuteError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.instructions.send(Instruction::Execute {
            method: method.into(),
            params,
            discard,
            timeout,
            reply_tx,
        });
        if sent.is_err() {
            return Err(ExecuteError::Cancelled);
        }
        reply_rx.await.unwrap_or(Err(ExecuteError::Cancelled))
    }
}

/// The connection state machine itself. Use [`Socket::spawn`] to start
/// the actor task and obtain a [`SocketHandle`].
pub struct Socket {
    url: String,
    options: SocketOptions,
    http_client: reqwest::Client,
    state: SocketState,
    seq: u32,
    next_id: u32,
    queue: HashMap<u32, PendingEntry>,
    stream: Option<WsStream>,
    events_tx: broadcast::Sender<SocketEvent>,
    instructions: mpsc::UnboundedReceiver<Instruction>,
    /// Clone of the instruction sender held by every [`SocketHandle`], kept
    /// so the actor can signal itself once a detached close's stream
    /// teardown finishes (see [`Instruction::StreamClosed`]).
    self_tx: mpsc::UnboundedSender<Instruction>,
    /// Set when a connect/close instruction arrives while `Closing`,
    /// honored once the in-flight close completes.
    refresh_pending: bool,
}

impl Socket {
    /// Spawns the actor task and returns a handle to it. The Socket
    /// starts `Idle`; call [`SocketHandle::connect`] to begin.
    #[must_use]
    pub fn spawn(url: impl Into<String>, options: SocketOptions) -> SocketHandle {
        let (instr_tx, instr_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(256);

        let socket = Self {
            url: url.into(),
            options,
            http_client: reqwest::Client::new(),
            state: SocketState::Idle,
            seq: 0,
            next_id: 0,
            queue: HashMap::new(),
            stream: None,
            events_tx: events_tx.clone(),
            instructions: instr_rx,
            self_tx: instr_tx.clone(),
            refresh_pending: false,
        };

        tokio::spawn(socket.run());

        SocketHandle {
            instructions: instr_tx,
            events: events_tx,
        }
    }

    fn emit(&self, event: SocketEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Earliest deadline among entries that can still time out. Settled
    /// entries (timed out already, reply_tx taken) stay in the queue per
    /// the Open Question decision but must not keep waking the sweep.
    fn earliest_deadline(&self) -> Option<Instant> {
        self.queue
            .values()
            .filter(|e| e.reply_tx.is_some())
            .map(|e| e.deadline)
            .min()
    }

    async fn run(mut self) {
        let mut reconnect_sleep: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;

        loop {
            let queue_sleep = self.earliest_deadline().map(tokio::time::sleep_until);

            tokio::select! {
                biased;

                instruction = self.instructions.recv() => {
                    match instruction {
                        Some(i) => self.handle_instruction(i).await,
                        None => {
                            debug!("all handles dropped, shutting down socket actor");
                            return;
                        }
                    }
                }

                msg = Self::next_stream_message(&mut self.stream), if self.stream.is_some() => {
                    self.handle_stream_message(msg).await;
                }

                () = async { reconnect_sleep.as_mut().unwrap().as_mut().await }, if reconnect_sleep.is_some() => {
                    reconnect_sleep = None;
                    self.attempt_reconnect().await;
                }

                () = async { queue_sleep.unwrap().await }, if queue_sleep.is_some() => {
                    self.sweep_timeouts().await;
                }
            }

            if self.state == SocketState::Reconnecting && reconnect_sleep.is_none() {
                let delay = self.options.reconnect_policy.next();
                info!(?delay, "scheduling reconnect attempt");
                reconnect_sleep = Some(Box::pin(tokio::time::sleep(delay)));
            }
            if self.state != SocketState::Reconnecting {
                reconnect_sleep = None;
            }
        }
    }

    async fn next_stream_message(stream: &mut Option<WsStream>) -> Option<Result<WsMessage, tokio_tungstenite::tungstenite::Error>> {
        match stream {
            Some(s) => s.next().await,
            None => std::future::pending().await,
        }
    }

    async fn handle_instruction(&mut self, instruction: Instruction) {
        match instruction {
            Instruction::Connect => self.on_connect_requested().await,
            Instruction::Close => self.on_close_requested().await,
            Instruction::Execute {
                method,
                params,
                discard,
                timeout,
                reply_tx,
            } => self.on_execute(method, params, discard, timeout, reply_tx).await,
            Instruction::Cancel(id) => self.on_cancel(id),
            Instruction::GetState(tx) => {
                let _ = tx.send(self.state);
            }
            Instruction::QueueSize(tx) => {
                let _ = tx.send(self.queue.len());
            }
            Instruction::StreamClosed { code, reason } => self.on_stream_closed(code, reason).await,
        }
    }

    async fn on_connect_requested(&mut self) {
        match self.state {
            SocketState::Idle => {
                self.state = SocketState::Connecting;
                self.try_open().await;
            }
            SocketState::Closing => {
                self.state = SocketState::Refreshing;
                self.refresh_pending = true;
            }
            SocketState::Connecting | SocketState::Connected | SocketState::Reconnecting | SocketState::Refreshing => {
                debug!(state = ?self.state, "connect requested, already in progress");
            }
        }
    }

    /// Requests a clean close. `Closing` is held as a real standing state
    /// across `run`'s `select!` iterations: the stream teardown is handed
    /// to a detached task that reports back via
    /// [`Instruction::StreamClosed`] instead of being awaited to
    /// completion here, so a `connect()` racing the close is actually
    /// observed while `state == Closing` and lands on `Refreshing` (spec
    /// §4.4) rather than always landing on the settled `Idle`.
    async fn on_close_requested(&mut self) {
        match self.state {
            SocketState::Idle => {}
            SocketState::Connected | SocketState::Connecting => {
                self.state = SocketState::Closing;
                self.cancel_all_queued();
                match self.stream.take() {
                    Some(mut stream) => {
                        let self_tx = self.self_tx.clone();
                        tokio::spawn(async move {
                            let _ = stream
                                .close(Some(CloseFrame {
                                    code: 1000u16.into(),
                                    reason: "client closing".into(),
                                }))
                                .await;
                            let _ = self_tx.send(Instruction::StreamClosed {
                                code: 1000,
                                reason: "client closing".into(),
                            });
                        });
                    }
                    None => {
                        // Nothing to tear down (e.g. still dialing, no
                        // stream handle yet); settle immediately.
                        let _ = self.self_tx.send(Instruction::StreamClosed {
                            code: 1000,
                            reason: "client closing".into(),
                        });
                    }
                }
            }
            SocketState::Reconnecting => {
                self.state = SocketState::Idle;
                self.cancel_all_queued();
            }
            SocketState::Closing | SocketState::Refreshing => {
                self.refresh_pending = false;
                self.state = SocketState::Closing;
            }
        }
    }

    async fn on_execute(
        &mut self,
        method: String,
        params: Value,
        discard: bool,
        timeout: Option<Duration>,
        reply_tx: oneshot::Sender<Result<Value, ExecuteError>>,
    ) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let wire = Method::new(id, method, params, discard);
        let packet = Packet::new(wire, timeout);

        let now = Instant::now();
        let deadline = if self.state == SocketState::Connected {
            now + packet.timeout(self.options.reply_timeout)
        } else {
            now + QUEUED_FALLBACK_TIMEOUT
        };

        self.queue.insert(
            id,
            PendingEntry {
                packet,
                reply_tx: Some(reply_tx),
                deadline,
            },
        );

        if self.state == SocketState::Connected {
            self.transmit(id).await;
        }
    }

    fn on_cancel(&mut self, id: u32) {
        if let Some(mut entry) = self.queue.remove(&id) {
            entry.packet.cancel();
            if let Some(tx) = entry.reply_tx.take() {
                let _ = tx.send(Err(ExecuteError::Cancelled));
            }
        }
    }

    /// Writes every Pending packet's frame. Called on transition to
    /// Connected; packets already Sending are left alone.
    async fn drain_queue(&mut self) {
        let pending_ids: Vec<u32> = self
            .queue
            .iter()
            .filter(|(_, e)| e.packet.state() == PacketState::Pending)
            .map(|(id, _)| *id)
            .collect();

        for id in pending_ids {
            self.transmit(id).await;
        }
    }

    async fn transmit(&mut self, id: u32) {
        let Some(entry) = self.queue.get_mut(&id) else { return };
        let stamped = entry.packet.stamp_sequence(self.seq);
        let discard = entry.packet.discard();

        let Some(stream) = self.stream.as_mut() else { return };
        let frame = MethodFrame::new(stamped);
        let text = match frame.to_json() {
            Ok(t) => t,
            Err(e) => {
                error!(%e, "failed to serialize outbound method");
                return;
            }
        };

        if stream.send(WsMessage::Text(text)).await.is_err() {
            warn!(id, "failed to write frame, leaving packet queued for reconnect");
            return;
        }

        let entry = self.queue.get_mut(&id).expect("entry present");
        entry.packet.mark_sending();
        entry.deadline = Instant::now() + entry.packet.timeout(self.options.reply_timeout);

        if discard {
            if let Some(tx) = entry.reply_tx.take() {
                let _ = tx.send(Ok(Value::Null));
            }
            self.queue.remove(&id);
        }
    }

    fn cancel_all_queued(&mut self) {
        for (_, mut entry) in self.queue.drain() {
            entry.packet.cancel();
            if let Some(tx) = entry.reply_tx.take() {
                let _ = tx.send(Err(ExecuteError::Cancelled));
            }
        }
    }

    async fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<u32> = self
            .queue
            .iter()
            .filter(|(_, e)| e.deadline <= now && e.reply_tx.is_some())
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(entry) = self.queue.get_mut(&id) {
                if let Some(tx) = entry.reply_tx.take() {
                    let _ = tx.send(Err(ExecuteError::Timeout));
                }
                // Entry intentionally stays in the queue: a timeout is a
                // failure, not a cancellation, and does not remove the
                // packet until the Socket actually closes.
            }
        }
    }

    async fn try_open(&mut self) {
        if let Some(checker) = self.options.reconnect_checker.clone() {
            if let Err(reason) = checker().await {
                warn!(%reason, "reconnect checker rejected connection attempt");
                self.state = SocketState::Idle;
                return;
            }
        }

        let headers = self.options.connect_headers();

        if self.options.preflight_enabled {
            if let Err(e) = preflight(&self.http_client, &self.url, &headers).await {
                warn!(error = %e, "preflight failed, abandoning connection attempt");
                self.emit(SocketEvent::Error(SocketError::Preflight(e)));
                self.state = SocketState::Idle;
                self.cancel_all_queued();
                return;
            }
        }

        match Self::dial(&self.url, &headers, &self.options.extra_query).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = SocketState::Connected;
                self.options.reconnect_policy.reset();
                self.emit(SocketEvent::Open);
                self.drain_queue().await;
            }
            Err(e) => {
                warn!(error = %e, "handshake failed");
                self.on_stream_closed(1011, format!("connect failed: {e}")).await;
            }
        }
    }

    async fn attempt_reconnect(&mut self) {
        self.state = SocketState::Connecting;
        self.try_open().await;
    }

    async fn dial(
        url: &str,
        headers: &HashMap<String, String>,
        extra_query: &HashMap<String, String>,
    ) -> Result<WsStream, String> {
        let mut parsed = Url::parse(url).map_err(|e| e.to_string())?;
        if !extra_query.is_empty() {
            // Caller values win on conflict: drop any existing pair whose
            // key the caller also supplied before re-appending, rather
            // than appending a duplicate key alongside the original.
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| !extra_query.contains_key(k.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();

            let mut pairs = parsed.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            for (k, v) in extra_query {
                pairs.append_pair(k, v);
            }
        }

        let mut request = parsed.as_str().into_client_request().map_err(|e| e.to_string())?;
        for (k, v) in headers {
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|e| e.to_string())?;
            let value = HeaderValue::from_str(v).map_err(|e| e.to_string())?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(stream)
    }

    async fn handle_stream_message(
        &mut self,
        msg: Option<Result<WsMessage, tokio_tungstenite::tungstenite::Error>>,
    ) {
        match msg {
            Some(Ok(WsMessage::Text(text))) => self.handle_text_frame(&text),
            Some(Ok(WsMessage::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1000, String::new()));
                self.on_stream_closed(code, reason).await;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "stream error, treating as close");
                self.on_stream_closed(1011, e.to_string()).await;
            }
            None => {
                self.on_stream_closed(1000, "stream ended".into()).await;
            }
        }
    }

    fn handle_text_frame(&mut self, text: &str) {
        match Frame::parse(text) {
            Ok(frame) => {
                if let Some(seq) = frame.seq() {
                    self.seq = self.seq.max(seq);
                }
                match frame {
                    Frame::Method(push) => self.emit(SocketEvent::Push(push)),
                    Frame::Reply(reply) => self.on_reply(reply),
                }
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                self.emit(SocketEvent::Error(SocketError::MessageParse(e)));
            }
        }
    }

    fn on_reply(&mut self, reply: crate::message::Reply) {
        let Some(mut entry) = self.queue.remove(&reply.id) else {
            debug!(id = reply.id, "reply for unknown or already-settled packet, dropping");
            return;
        };
        entry.packet.mark_replied();
        if let Some(tx) = entry.reply_tx.take() {
            let outcome = match (reply.result, reply.error) {
                (_, Some(err)) => Err(ExecuteError::Interactive(InteractiveError {
                    code: err.code,
                    message: err.message,
                    path: err.path,
                })),
                (result, None) => Ok(result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        }
    }

    async fn on_stream_closed(&mut self, code: u16, reason: String) {
        self.stream = None;
        self.emit(SocketEvent::Close { code, reason: reason.clone() });

        let recoverable = is_recoverable_close(code);

        match self.state {
            SocketState::Connecting | SocketState::Connected if recoverable => {
                self.state = SocketState::Reconnecting;
            }
            SocketState::Connecting | SocketState::Connected => {
                self.emit(SocketEvent::Error(SocketError::Interactive(InteractiveError::from_close(
                    code, reason,
                ))));
                self.state = SocketState::Idle;
                self.cancel_all_queued();
            }
            SocketState::Closing => {
                self.state = SocketState::Idle;
                self.cancel_all_queued();
            }
            SocketState::Refreshing => {
                self.refresh_pending = false;
                self.state = SocketState::Connecting;
                self.try_open().await;
            }
            SocketState::Idle | SocketState::Reconnecting => {}
        }
    }
}
