//! Configuration knobs for servers, clients, and the wire-level codec.

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig as RustlsClientConfig;
use rustls::ServerConfig as RustlsServerConfig;

/// Shared limits and timeouts that apply regardless of role.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Hard cap on a single frame's payload length. Frames exceeding this
    /// fail with `ProtocolError::TooBig`.
    pub max_frame_payload: usize,
    /// Hard cap on the bytes accepted while scanning a handshake request
    /// for the terminating `\r\n\r\n`. Exceeding it yields `400 Bad Request`.
    pub max_header_bytes: usize,
    /// Bound on the opening handshake, both directions.
    pub handshake_timeout: Duration,
    /// Bound on waiting for the peer to reciprocate a CLOSE frame before
    /// forcing the socket shut.
    pub close_timeout: Duration,
    /// Whether a panicking `WSListener` callback forces the connection
    /// closed with `WSCloseCode::InternalError` (true) or is merely logged
    /// and the connection left open (false).
    pub disconnect_on_exception: bool,
    /// Buffered-bytes threshold above which `pause_writing` fires.
    pub write_high_watermark: usize,
    /// Buffered-bytes threshold below which `resume_writing` fires.
    pub write_low_watermark: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_payload: 16 << 20,
            max_header_bytes: 16 * 1024,
            handshake_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(5),
            disconnect_on_exception: true,
            write_high_watermark: 1 << 20,
            write_low_watermark: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub web_socket_config: WebSocketConfig,
    pub tls_config: Option<Arc<RustlsServerConfig>>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub web_socket_config: WebSocketConfig,
    pub tls_config: Option<Arc<RustlsClientConfig>>,
}
