//! `ripple-ws`: a callback-driven RFC 6455 WebSocket endpoint library for
//! client and server, built on tokio.
//!
//! The library owns the socket, parses incoming bytes into frames,
//! serializes outgoing frames, drives the opening HTTP/1.1 Upgrade
//! handshake, and enforces protocol-level invariants. Applications
//! implement [`WSListener`] to observe connection lifecycle, frame, and
//! backpressure events.
//!
//! ```no_run
//! use ripple_ws::{ws_connect, WSFrame, WSListener, WSMsgType, WSTransport};
//! use ripple_ws::config::ClientConfig;
//!
//! struct Echo;
//! impl WSListener for Echo {
//!     fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
//!         let _ = transport.send(frame.msg_type, &frame.payload, frame.fin, frame.rsv1);
//!     }
//! }
//!
//! # async fn run() -> Result<(), ripple_ws::error::WSError> {
//! let (transport, _listener) = ws_connect(|| Echo, "ws://127.0.0.1:9000/", ClientConfig::default()).await?;
//! transport.send(WSMsgType::Text, b"hello", true, false)?;
//! # Ok(())
//! # }
//! ```

mod client;
/// The incremental frame parser and single-frame serializer. Exposed mainly
/// so `fuzz/` can drive `FrameDecoder` directly without a live socket; most
/// applications only ever see [`WSFrame`] via [`WSListener::on_ws_frame`].
pub mod codec;
pub mod config;
mod connection;
pub mod error;
pub mod frame;
mod handshake;
pub mod listener;
mod request;
pub mod server;
mod stream;
pub mod transport;
mod util;

pub use client::ws_connect;
pub use connection::Role;
pub use frame::{WSCloseCode, WSFrame, WSMsgType};
pub use listener::{FactoryOutcome, WSListener};
pub use request::UpgradeRequest;
pub use server::{ws_create_server, Server};
pub use transport::WSTransport;
