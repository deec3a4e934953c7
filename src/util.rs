//! Small helpers shared by the client/server handshake paths and by
//! `catch_unwind` call sites that need to render a panic payload for logging.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(sha1(key ++ GUID))`, per RFC 6455 §1.3.
pub(crate) fn generate_accept_value(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// A fresh `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
pub(crate) fn generate_websocket_key() -> String {
    let bytes: [u8; 16] = rand::random();
    BASE64_STANDARD.encode(bytes)
}

/// Renders a `std::panic::catch_unwind` payload as a string for logging or
/// for surfacing through `FactoryOutcome::Error`.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked with a non-string payload".to_string())
}
