//! Wire-level frame types: opcodes, close codes, and the frame view handed
//! to [`crate::listener::WSListener::on_ws_frame`].

use bytes::Bytes;

use crate::error::ProtocolError;

/// The six opcodes this library understands. Any other nibble on the wire
/// is a reserved opcode and MUST be rejected (RFC 6455 §5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WSMsgType {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl WSMsgType {
    /// Control frames (CLOSE, PING, PONG) must not be fragmented and are
    /// capped at 125 bytes of payload.
    pub fn is_control(self) -> bool {
        matches!(self, WSMsgType::Close | WSMsgType::Ping | WSMsgType::Pong)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for WSMsgType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x0 => Ok(WSMsgType::Continuation),
            0x1 => Ok(WSMsgType::Text),
            0x2 => Ok(WSMsgType::Binary),
            0x8 => Ok(WSMsgType::Close),
            0x9 => Ok(WSMsgType::Ping),
            0xA => Ok(WSMsgType::Pong),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }
}

/// IANA-registered close codes recognized by the library (RFC 6455 §7.4).
/// `NoStatus` and `Abnormal` are reserved: they describe a state, and must
/// never actually be written onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WSCloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    UnsupportedData,
    NoStatus,
    Abnormal,
    InvalidText,
    Policy,
    TooBig,
    MandatoryExt,
    InternalError,
    Other(u16),
}

impl WSCloseCode {
    pub fn code(self) -> u16 {
        match self {
            WSCloseCode::Normal => 1000,
            WSCloseCode::GoingAway => 1001,
            WSCloseCode::ProtocolError => 1002,
            WSCloseCode::UnsupportedData => 1003,
            WSCloseCode::NoStatus => 1005,
            WSCloseCode::Abnormal => 1006,
            WSCloseCode::InvalidText => 1007,
            WSCloseCode::Policy => 1008,
            WSCloseCode::TooBig => 1009,
            WSCloseCode::MandatoryExt => 1010,
            WSCloseCode::InternalError => 1011,
            WSCloseCode::Other(code) => code,
        }
    }
}

impl From<u16> for WSCloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => WSCloseCode::Normal,
            1001 => WSCloseCode::GoingAway,
            1002 => WSCloseCode::ProtocolError,
            1003 => WSCloseCode::UnsupportedData,
            1005 => WSCloseCode::NoStatus,
            1006 => WSCloseCode::Abnormal,
            1007 => WSCloseCode::InvalidText,
            1008 => WSCloseCode::Policy,
            1009 => WSCloseCode::TooBig,
            1010 => WSCloseCode::MandatoryExt,
            1011 => WSCloseCode::InternalError,
            other => WSCloseCode::Other(other),
        }
    }
}

/// A single WebSocket frame as delivered to the application.
///
/// `payload` is a [`Bytes`] view into the decoder's read buffer. It is
/// cheap to clone (refcounted) but only valid for the duration of the
/// `on_ws_frame` call that handed it out — the decoder reuses its backing
/// buffer for the next frame once the callback returns. Copy out anything
/// you need to retain past the call.
#[derive(Debug, Clone)]
pub struct WSFrame {
    pub msg_type: WSMsgType,
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub payload: Bytes,
}

impl WSFrame {
    /// For a CLOSE frame: the big-endian u16 status code from the first
    /// two payload bytes, or [`WSCloseCode::NoStatus`] if the peer sent an
    /// empty close payload.
    pub fn close_code(&self) -> WSCloseCode {
        if self.payload.len() >= 2 {
            let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
            WSCloseCode::from(code)
        } else {
            WSCloseCode::NoStatus
        }
    }

    /// For a CLOSE frame: the bytes after the status code, if any.
    pub fn close_message(&self) -> Bytes {
        if self.payload.len() > 2 {
            self.payload.slice(2..)
        } else {
            Bytes::new()
        }
    }

    /// Interprets the payload as ASCII. Returns `None` if any byte is
    /// non-ASCII.
    pub fn as_ascii_text(&self) -> Option<&str> {
        if self.payload.is_ascii() {
            std::str::from_utf8(&self.payload).ok()
        } else {
            None
        }
    }

    /// Validates the payload as UTF-8 and returns it as `&str`. Validation
    /// is performed lazily, on demand, not at parse time.
    pub fn as_utf8_text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }
}
