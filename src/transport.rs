//! The transport adapter: owns the socket, runs the read/write tasks, and
//! exposes the `WSTransport` handle applications hold.
//!
//! Grounded on the teacher's `write.rs` (`Writer`/`WriterKind` client/server
//! masking split) and `split.rs` (`WSWriter`/`WSReader` channel-backed
//! halves), generalized from "writer awaits directly on the socket under a
//! `tokio::sync::Mutex`" to "one task owns each socket half", per SPEC_FULL.md
//! §4.4 — this is what makes `send()` non-suspending and watermark
//! backpressure observable without blocking the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

use crate::codec::{encode_frame, FrameDecoder, RawFrame};
use crate::config::WebSocketConfig;
use crate::connection::{ConnState, ConnectionState, Role};
use crate::error::{ProtocolError, WSError};
use crate::frame::{WSCloseCode, WSFrame, WSMsgType};
use crate::listener::WSListener;
use crate::stream::WsStream;
use crate::util::panic_message;

/// Bytes queued for the write task, or a request to close the socket once
/// everything already queued has been flushed.
enum WriteCommand {
    Frame(Bytes),
    Shutdown,
}

enum WatermarkEdge {
    Pause,
    Resume,
}

/// State shared between a connection's driver task, its write task, and
/// every clone of the `WSTransport` handle.
struct ConnectionShared {
    role: Role,
    is_secure: bool,
    state: ConnectionState,
    buffered_bytes: AtomicUsize,
    paused: AtomicBool,
    high_watermark: AtomicUsize,
    low_watermark: AtomicUsize,
    sent_close: AtomicBool,
    close_timeout: Duration,
    /// Close code the driver should send before honoring the next
    /// `force_disconnect` notification, if any — set by `dispatch()` when a
    /// panicking listener callback forces the connection shut with
    /// `WSCloseCode::InternalError` (spec.md §4.3); left `None` for a plain
    /// `WSTransport::disconnect()`, which just tears down the socket.
    disconnect_reason: Mutex<Option<WSCloseCode>>,
    force_disconnect: Notify,
    disconnected: Notify,
}

/// The public handle an application holds for one connection. Cheap to
/// clone; every clone refers to the same underlying socket.
#[derive(Clone)]
pub struct WSTransport {
    shared: Arc<ConnectionShared>,
    write_tx: mpsc::UnboundedSender<WriteCommand>,
    watermark_tx: mpsc::UnboundedSender<WatermarkEdge>,
}

impl WSTransport {
    pub fn is_secure(&self) -> bool {
        self.shared.is_secure
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Current count of bytes queued for the socket but not yet written.
    pub fn buffered_bytes(&self) -> usize {
        self.shared.buffered_bytes.load(Ordering::Acquire)
    }

    /// Re-tunes the backpressure thresholds at runtime — the "accessor to
    /// the underlying transport for buffer-limit tuning" spec.md §6 asks for.
    pub fn set_write_watermarks(&self, high: usize, low: usize) {
        self.shared.high_watermark.store(high, Ordering::Release);
        self.shared.low_watermark.store(low, Ordering::Release);
    }

    /// Serializes and queues a frame. Never suspends: bytes are handed to
    /// the write task's channel and this returns immediately.
    ///
    /// `msg_type == Close` is routed through the same one-CLOSE-per-direction
    /// bookkeeping `send_close` uses (spec.md §3): a listener that reacts to
    /// an inbound CLOSE by echoing the frame back through this generic path
    /// — rather than calling `send_close` directly — still only ever puts
    /// one CLOSE frame on the wire; a second attempt is a silent no-op.
    pub fn send(
        &self,
        msg_type: WSMsgType,
        payload: &[u8],
        fin: bool,
        rsv1: bool,
    ) -> Result<(), WSError> {
        let state = self.shared.state.get();
        if state == ConnState::Connecting || state == ConnState::Closed {
            return Err(WSError::Transport(not_connected()));
        }
        if !msg_type.is_control() && self.shared.sent_close.load(Ordering::Acquire) {
            return Err(WSError::Transport(not_connected()));
        }
        if msg_type == WSMsgType::Close && !self.claim_close_send() {
            return Ok(());
        }
        let bytes = encode_frame(msg_type, payload, fin, rsv1, self.shared.role);
        self.enqueue(bytes)
    }

    /// Convenience for a single, unfragmented TEXT/BINARY message:
    /// `fin=true, rsv1=false`.
    pub fn send_message(&self, msg_type: WSMsgType, payload: &[u8]) -> Result<(), WSError> {
        self.send(msg_type, payload, true, false)
    }

    pub fn send_ping(&self, payload: &[u8]) -> Result<(), WSError> {
        self.send(WSMsgType::Ping, payload, true, false)
    }

    pub fn send_pong(&self, payload: &[u8]) -> Result<(), WSError> {
        self.send(WSMsgType::Pong, payload, true, false)
    }

    /// Emits a CLOSE frame (code + UTF-8 reason, total payload <= 125
    /// bytes) and transitions OPEN -> CLOSING. A second call after the
    /// first is a no-op: spec.md §3 forbids more than one CLOSE per
    /// direction — and that holds whether the first CLOSE went out through
    /// this method or through a listener calling the generic `send` with
    /// `msg_type == Close` (e.g. echoing an inbound CLOSE uniformly).
    pub fn send_close(&self, code: WSCloseCode, reason: &[u8]) -> Result<(), WSError> {
        let state = self.shared.state.get();
        if state == ConnState::Connecting || state == ConnState::Closed {
            return Err(WSError::Transport(not_connected()));
        }
        if !self.claim_close_send() {
            return Ok(());
        }

        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.code().to_be_bytes());
        payload.extend_from_slice(reason);
        let bytes = encode_frame(WSMsgType::Close, &payload, true, false, self.shared.role);
        let result = self.enqueue(bytes);

        // Per spec.md §4.3: a side that initiates CLOSE waits up to the
        // close timeout for the peer to reciprocate before forcing the
        // socket shut.
        let deadline_transport = self.clone();
        let close_timeout = self.shared.close_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(close_timeout).await;
            if !deadline_transport.shared.state.is_closed() {
                deadline_transport.disconnect();
            }
        });

        result
    }

    /// Atomically claims this direction's one allowed CLOSE frame (spec.md
    /// §3). Returns `true` the first time — the caller should proceed to
    /// transition OPEN -> CLOSING and enqueue the frame — and `false` on
    /// every later attempt, which the caller must treat as a no-op rather
    /// than putting a second CLOSE on the wire.
    fn claim_close_send(&self) -> bool {
        if self.shared.sent_close.swap(true, Ordering::AcqRel) {
            false
        } else {
            self.shared.state.begin_closing();
            true
        }
    }

    /// Forces the socket closed regardless of protocol state, after a
    /// best-effort flush of whatever is already queued.
    pub fn disconnect(&self) {
        self.shared.force_disconnect.notify_one();
    }

    /// Resolves once the connection has reached CLOSED.
    pub async fn wait_disconnected(&self) {
        loop {
            if self.shared.state.is_closed() {
                return;
            }
            self.shared.disconnected.notified().await;
        }
    }

    fn enqueue(&self, bytes: Bytes) -> Result<(), WSError> {
        let n = bytes.len();
        let new_total = self.shared.buffered_bytes.fetch_add(n, Ordering::AcqRel) + n;
        if new_total > self.shared.high_watermark.load(Ordering::Acquire)
            && !self.shared.paused.swap(true, Ordering::AcqRel)
        {
            let _ = self.watermark_tx.send(WatermarkEdge::Pause);
        }
        self.write_tx
            .send(WriteCommand::Frame(bytes))
            .map_err(|_| WSError::Transport(not_connected()))
    }

    fn note_flushed(&self, n: usize) {
        let prev = self.shared.buffered_bytes.fetch_sub(n, Ordering::AcqRel);
        let new_total = prev - n;
        if new_total <= self.shared.low_watermark.load(Ordering::Acquire)
            && self.shared.paused.swap(false, Ordering::AcqRel)
        {
            let _ = self.watermark_tx.send(WatermarkEdge::Resume);
        }
    }
}

fn not_connected() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "websocket is not open")
}

/// Tracks an in-progress fragmented data message so continuation frames
/// and interleaved control frames are validated per spec.md §3's rules.
struct FragmentState {
    in_progress: Option<WSMsgType>,
}

impl FragmentState {
    fn new() -> Self {
        FragmentState { in_progress: None }
    }

    fn observe(&mut self, frame: &RawFrame) -> Result<(), ProtocolError> {
        if frame.msg_type.is_control() {
            return Ok(());
        }
        match frame.msg_type {
            WSMsgType::Continuation => {
                if self.in_progress.is_none() {
                    return Err(ProtocolError::UnexpectedContinuation);
                }
                if frame.fin {
                    self.in_progress = None;
                }
            }
            WSMsgType::Text | WSMsgType::Binary => {
                if self.in_progress.is_some() {
                    return Err(ProtocolError::FragmentedInProgress);
                }
                if !frame.fin {
                    self.in_progress = Some(frame.msg_type);
                }
            }
            _ => unreachable!("control frames handled above"),
        }
        Ok(())
    }
}

/// Spawns the read (driver) and write tasks for a freshly-opened
/// connection and returns the handle the caller hands to its own code plus
/// keeps alive for the listener's lifetime. The listener's `on_ws_connected`
/// is invoked before this returns.
pub(crate) fn spawn<L>(stream: WsStream, role: Role, config: WebSocketConfig, listener: L) -> WSTransport
where
    L: WSListener + 'static,
{
    let is_secure = stream.is_secure();
    let (read_half, write_half) = tokio::io::split(stream);
    let (write_tx, write_rx) = mpsc::unbounded_channel::<WriteCommand>();
    let (watermark_tx, watermark_rx) = mpsc::unbounded_channel::<WatermarkEdge>();

    let shared = Arc::new(ConnectionShared {
        role,
        is_secure,
        state: ConnectionState::new(),
        buffered_bytes: AtomicUsize::new(0),
        paused: AtomicBool::new(false),
        high_watermark: AtomicUsize::new(config.write_high_watermark),
        low_watermark: AtomicUsize::new(config.write_low_watermark),
        sent_close: AtomicBool::new(false),
        close_timeout: config.close_timeout,
        disconnect_reason: Mutex::new(None),
        force_disconnect: Notify::new(),
        disconnected: Notify::new(),
    });

    let transport = WSTransport {
        shared: shared.clone(),
        write_tx: write_tx.clone(),
        watermark_tx,
    };

    let write_handle = tokio::spawn(run_write_task(write_half, write_rx, transport.clone()));
    tokio::spawn(run_driver_task(
        read_half,
        config,
        role,
        shared,
        watermark_rx,
        write_tx,
        write_handle,
        listener,
        transport.clone(),
    ));

    transport
}

async fn run_write_task(
    mut write_half: tokio::io::WriteHalf<WsStream>,
    mut write_rx: mpsc::UnboundedReceiver<WriteCommand>,
    transport: WSTransport,
) {
    while let Some(cmd) = write_rx.recv().await {
        match cmd {
            WriteCommand::Frame(bytes) => {
                // Coalesce whatever else is already queued into one write.
                let mut batch = BytesMut::from(&bytes[..]);
                let mut coalesced = bytes.len();
                while let Ok(WriteCommand::Frame(more)) = write_rx.try_recv() {
                    batch.extend_from_slice(&more);
                    coalesced += more.len();
                }
                if let Err(err) = write_half.write_all(&batch).await {
                    warn!("websocket write failed: {err}");
                    transport.note_flushed(coalesced);
                    break;
                }
                transport.note_flushed(coalesced);
            }
            WriteCommand::Shutdown => {
                let _ = write_half.flush().await;
                let _ = write_half.shutdown().await;
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_driver_task<L>(
    mut read_half: tokio::io::ReadHalf<WsStream>,
    config: WebSocketConfig,
    role: Role,
    shared: Arc<ConnectionShared>,
    mut watermark_rx: mpsc::UnboundedReceiver<WatermarkEdge>,
    write_tx: mpsc::UnboundedSender<WriteCommand>,
    write_handle: tokio::task::JoinHandle<()>,
    mut listener: L,
    transport: WSTransport,
) where
    L: WSListener + 'static,
{
    shared.state.mark_open();
    dispatch(&mut listener, config.disconnect_on_exception, &shared, |l| {
        l.on_ws_connected(&transport)
    });

    let mut decoder = FrameDecoder::new(&config, role);
    let mut fragments = FragmentState::new();
    let mut scratch = vec![0u8; 8192];
    let mut close_reason: Option<(WSCloseCode, bool)> = None;

    'driver: loop {
        tokio::select! {
            biased;
            _ = shared.force_disconnect.notified() => {
                let reason = shared.disconnect_reason.lock().unwrap().take();
                if let Some(code) = reason {
                    let _ = transport.send_close(code, b"");
                    close_reason = Some((code, false));
                } else {
                    close_reason = Some((WSCloseCode::Normal, false));
                }
                break 'driver;
            }
            edge = watermark_rx.recv() => {
                match edge {
                    Some(WatermarkEdge::Pause) => {
                        dispatch(&mut listener, config.disconnect_on_exception, &shared, |l| l.pause_writing());
                    }
                    Some(WatermarkEdge::Resume) => {
                        dispatch(&mut listener, config.disconnect_on_exception, &shared, |l| l.resume_writing());
                    }
                    None => {}
                }
            }
            read_result = read_half.read(&mut scratch) => {
                let n = match read_result {
                    Ok(0) => {
                        close_reason = Some((WSCloseCode::Abnormal, false));
                        break 'driver;
                    }
                    Ok(n) => n,
                    Err(err) => {
                        debug!("websocket read error: {err}");
                        close_reason = Some((WSCloseCode::Abnormal, false));
                        break 'driver;
                    }
                };
                decoder.feed(&scratch[..n]);
                loop {
                    let raw = match decoder.next_frame() {
                        Ok(Some(raw)) => raw,
                        Ok(None) => break,
                        Err(err) => {
                            warn!("protocol error, closing: {err}");
                            let _ = transport.send_close(WSCloseCode::ProtocolError, b"");
                            close_reason = Some((WSCloseCode::ProtocolError, true));
                            break 'driver;
                        }
                    };

                    if let Err(err) = fragments.observe(&raw) {
                        warn!("protocol error, closing: {err}");
                        let _ = transport.send_close(WSCloseCode::ProtocolError, b"");
                        close_reason = Some((WSCloseCode::ProtocolError, true));
                        break 'driver;
                    }

                    if raw.msg_type == WSMsgType::Ping {
                        let _ = transport.send_pong(&raw.payload);
                    }

                    let frame = WSFrame {
                        msg_type: raw.msg_type,
                        fin: raw.fin,
                        rsv1: raw.rsv1,
                        rsv2: raw.rsv2,
                        rsv3: raw.rsv3,
                        payload: raw.payload,
                    };

                    let is_close = frame.msg_type == WSMsgType::Close;
                    let peer_code = frame.close_code();
                    dispatch(&mut listener, config.disconnect_on_exception, &shared, |l| {
                        l.on_ws_frame(&transport, &frame)
                    });

                    if is_close {
                        if shared.sent_close.load(Ordering::Acquire) {
                            // We initiated; this is the peer's reciprocation.
                            close_reason = Some((peer_code, false));
                        } else {
                            // Peer-initiated: echo the code back, then disconnect.
                            let _ = transport.send_close(peer_code, b"");
                            close_reason = Some((peer_code, false));
                        }
                        break 'driver;
                    }
                }
            }
        }
    }

    let (code, _already_closing) = close_reason.unwrap_or((WSCloseCode::Abnormal, false));
    debug!("websocket closing with code {:?}", code.code());

    let _ = write_tx.send(WriteCommand::Shutdown);
    let _ = timeout(config.close_timeout, write_handle).await;

    shared.state.mark_closed();
    dispatch(&mut listener, config.disconnect_on_exception, &shared, |l| {
        l.on_ws_disconnected(&transport)
    });
    shared.disconnected.notify_waiters();
}

/// Invokes one listener callback, catching a panic the way spec.md §4.3's
/// `disconnect_on_exception` flag describes: Rust has no catchable
/// exceptions, so a panicking callback is the closest analogue. A caught
/// panic is logged; if `disconnect_on_exception` is set, the connection is
/// forced to CLOSED with a CLOSE(1011, `WSCloseCode::InternalError`) frame
/// sent to the peer once the driver loop next observes `shared.state`.
fn dispatch<L, F>(listener: &mut L, disconnect_on_exception: bool, shared: &ConnectionShared, f: F)
where
    L: WSListener,
    F: FnOnce(&mut L),
{
    let guarded = AssertUnwindSafe((listener, f));
    let result = catch_unwind(move || {
        let AssertUnwindSafe((listener, f)) = guarded;
        f(listener)
    });
    if let Err(panic) = result {
        error!("websocket listener callback panicked: {}", panic_message(panic));
        if disconnect_on_exception {
            *shared.disconnect_reason.lock().unwrap() = Some(WSCloseCode::InternalError);
            shared.force_disconnect.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_state_rejects_unexpected_continuation() {
        let mut state = FragmentState::new();
        let raw = RawFrame {
            msg_type: WSMsgType::Continuation,
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            payload: Bytes::new(),
        };
        assert_eq!(
            state.observe(&raw).unwrap_err(),
            ProtocolError::UnexpectedContinuation
        );
    }

    #[test]
    fn fragment_state_rejects_new_message_mid_fragment() {
        let mut state = FragmentState::new();
        let start = RawFrame {
            msg_type: WSMsgType::Text,
            fin: false,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            payload: Bytes::new(),
        };
        state.observe(&start).unwrap();

        let interloper = RawFrame {
            msg_type: WSMsgType::Binary,
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            payload: Bytes::new(),
        };
        assert_eq!(
            state.observe(&interloper).unwrap_err(),
            ProtocolError::FragmentedInProgress
        );
    }

    #[test]
    fn fragment_state_allows_control_frames_to_interleave() {
        let mut state = FragmentState::new();
        let start = RawFrame {
            msg_type: WSMsgType::Text,
            fin: false,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            payload: Bytes::new(),
        };
        state.observe(&start).unwrap();

        let ping = RawFrame {
            msg_type: WSMsgType::Ping,
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            payload: Bytes::new(),
        };
        state.observe(&ping).unwrap();

        let cont = RawFrame {
            msg_type: WSMsgType::Continuation,
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            payload: Bytes::new(),
        };
        state.observe(&cont).unwrap();
    }
}
