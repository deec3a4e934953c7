//! Error taxonomy. `WSError` is the single error type surfaced by every
//! public entry point; its sub-enums group causes the way spec §7 does
//! (protocol violations, handshake rejections, timeouts, transport faults).

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WSError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("operation timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("invalid WebSocket URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<tokio::time::error::Elapsed> for WSError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        WSError::Timeout
    }
}

/// Wire-framing violations. Every variant here maps to closing the
/// connection with [`crate::frame::WSCloseCode::ProtocolError`] (1002).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("reserved bit set without a negotiated extension")]
    RsvReserved,

    #[error("control frames must not be fragmented")]
    ControlFrameFragmented,

    #[error("control frame payload exceeds 125 bytes")]
    ControlFramePayloadTooLarge,

    #[error("close frame payload of exactly 1 byte is invalid")]
    InvalidCloseLength,

    #[error("frame payload exceeds the configured maximum")]
    TooBig,

    #[error("client received a masked frame, or server received an unmasked frame")]
    MaskMismatch,

    #[error("text frame payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("continuation frame with no fragmented message in progress")]
    UnexpectedContinuation,

    #[error("a new data frame started while a fragmented message was in progress")]
    FragmentedInProgress,
}

/// Handshake rejections, surfaced to the caller of `ws_connect` /
/// encountered while serving an upgrade request.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("server responded with {status_line}")]
    NonSwitchingResponse { status_line: String },

    #[error("response is missing a valid Upgrade: websocket header")]
    MissingUpgradeHeader,

    #[error("response is missing a valid Connection: Upgrade header")]
    MissingConnectionHeader,

    #[error("Sec-WebSocket-Accept did not match the expected value")]
    BadAcceptKey,

    #[error("request is missing Sec-WebSocket-Key")]
    MissingSecWebSocketKey,

    #[error("malformed HTTP request: {0}")]
    MalformedRequest(#[from] httparse::Error),

    #[error("request headers exceeded the configured size limit")]
    HeaderTooLarge,

    #[error("incomplete HTTP request")]
    Incomplete,
}
