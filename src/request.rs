//! HTTP/1.1 request construction (client side) and parsing (server side)
//! for the opening handshake.
//!
//! The client-side URL-to-request logic is grounded on the teacher's
//! `construct_http_request`. The server-side parser replaces the teacher's
//! hand-rolled `HttpRequest::parse_http_request` (a `read_line`-until-blank
//! loop over a growable `String`) with `httparse`, which the teacher
//! declared as a dependency but never actually called.

use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use crate::error::{HandshakeError, WSError};

/// Parsed request line + headers for an incoming upgrade request, handed
/// to the server's connection factory so it can inspect path/headers and
/// decide whether to accept, reject, or route the connection.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub method: String,
    /// Request-target exactly as sent on the wire, including any query
    /// string — never normalized or re-encoded.
    pub path: String,
    pub version: String,
    /// Name (lowercased), value pairs in the order they appeared on the
    /// wire. A header repeated by the client shows up as two entries here,
    /// same as `httparse` hands them to us.
    headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Case-insensitive header lookup. Returns the first matching value if
    /// the header was sent more than once.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All header (name-lowercased, value) pairs, in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Reads bytes from `reader` until a complete HTTP request line + header
/// block (`\r\n\r\n`) has arrived, or `max_header_bytes` is exceeded.
pub(crate) async fn read_upgrade_request<R>(
    reader: &mut R,
    max_header_bytes: usize,
) -> Result<UpgradeRequest, WSError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut request = httparse::Request::new(&mut headers);

        match request.parse(&buf) {
            Ok(httparse::Status::Complete(_)) => {
                let method = request.method.unwrap_or("").to_string();
                let path = request.path.unwrap_or("").to_string();
                let version = match request.version {
                    Some(1) => "HTTP/1.1".to_string(),
                    Some(0) => "HTTP/1.0".to_string(),
                    _ => String::new(),
                };
                let headers = request
                    .headers
                    .iter()
                    .map(|header| {
                        (
                            header.name.to_ascii_lowercase(),
                            String::from_utf8_lossy(header.value).trim().to_string(),
                        )
                    })
                    .collect();
                return Ok(UpgradeRequest {
                    method,
                    path,
                    version,
                    headers,
                });
            }
            Ok(httparse::Status::Partial) => {
                if buf.len() >= max_header_bytes {
                    return Err(WSError::Handshake(HandshakeError::HeaderTooLarge));
                }
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    return Err(WSError::Handshake(HandshakeError::Incomplete));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(err) => return Err(WSError::Handshake(HandshakeError::MalformedRequest(err))),
        }
    }
}

/// The pieces needed to open a TCP connection and send the client's
/// opening handshake request.
pub(crate) struct ClientRequestParts {
    pub request_bytes: Vec<u8>,
    pub host_with_port: String,
    pub host: String,
    pub use_tls: bool,
}

/// Parses a `ws://`/`wss://` URL and builds the GET request that kicks off
/// the client handshake. The `Sec-WebSocket-Key` must be supplied by the
/// caller so the handshake function can retain it for accept-key checking.
pub(crate) fn build_client_request(ws_url: &str, key: &str) -> Result<ClientRequestParts, WSError> {
    let parsed = Url::parse(ws_url)?;

    let (default_port, use_tls) = match parsed.scheme() {
        "ws" => (80, false),
        "wss" => (443, true),
        _ => {
            return Err(WSError::Internal(
                "WebSocket URL scheme must be ws:// or wss://",
            ))
        }
    };

    let host = parsed
        .host_str()
        .ok_or(WSError::Internal("WebSocket URL is missing a host"))?;
    let port = parsed.port().unwrap_or(default_port);
    let host_with_port = format!("{}:{}", host, port);

    let host_header = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );

    Ok(ClientRequestParts {
        request_bytes: request.into_bytes(),
        host_with_port,
        host: host.to_string(),
        use_tls,
    })
}
