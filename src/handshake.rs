//! The opening HTTP/1.1 Upgrade exchange, both directions.
//!
//! Client side is grounded on the teacher's `request.rs::construct_http_request`
//! (reused by `request.rs` in this crate almost verbatim) plus response
//! validation per spec.md §4.2. Server side is grounded on the teacher's
//! `handshake.rs::header_read` (the read-until-key-found loop, generalized
//! to read-until-`\r\n\r\n` via `httparse`) and its response-writing shape.

use std::panic::{catch_unwind, AssertUnwindSafe};

use httparse::Status;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::{ClientConfig, ServerConfig};
use crate::error::{HandshakeError, WSError};
use crate::listener::FactoryOutcome;
use crate::request::{build_client_request, read_upgrade_request, UpgradeRequest};
use crate::util::{generate_accept_value, generate_websocket_key, panic_message};

/// Performs the client side of the handshake over an already-connected
/// stream: sends the GET request, parses the response, validates status,
/// `Upgrade`, `Connection`, and `Sec-WebSocket-Accept`. Bounded by
/// `config.handshake_timeout`.
pub(crate) async fn client_handshake<S>(
    stream: &mut S,
    path_and_headers: &[u8],
    key: &str,
    config: &ClientConfig,
) -> Result<(), WSError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    timeout(
        config.web_socket_config.handshake_timeout,
        client_handshake_inner(stream, path_and_headers, key),
    )
    .await
    .map_err(|_| WSError::Timeout)?
}

async fn client_handshake_inner<S>(
    stream: &mut S,
    request_bytes: &[u8],
    key: &str,
) -> Result<(), WSError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request_bytes).await?;
    stream.flush().await?;

    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut response = httparse::Response::new(&mut headers);

        match response.parse(&buf) {
            Ok(Status::Complete(_)) => {
                let code = response.code.unwrap_or(0);
                if code != 101 {
                    let reason = response.reason.unwrap_or("");
                    return Err(WSError::Handshake(HandshakeError::NonSwitchingResponse {
                        status_line: format!("{code} {reason}"),
                    }));
                }

                let has_header = |name: &str, expected: &str| {
                    response.headers.iter().any(|h| {
                        h.name.eq_ignore_ascii_case(name)
                            && std::str::from_utf8(h.value)
                                .map(|v| v.trim().eq_ignore_ascii_case(expected))
                                .unwrap_or(false)
                    });
                };
                if !has_header("Upgrade", "websocket") {
                    return Err(WSError::Handshake(HandshakeError::MissingUpgradeHeader));
                }
                if !has_header("Connection", "Upgrade") {
                    return Err(WSError::Handshake(HandshakeError::MissingConnectionHeader));
                }

                let accept = response
                    .headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case("Sec-WebSocket-Accept"))
                    .and_then(|h| std::str::from_utf8(h.value).ok())
                    .map(str::trim);
                if accept != Some(generate_accept_value(key).as_str()) {
                    return Err(WSError::Handshake(HandshakeError::BadAcceptKey));
                }

                return Ok(());
            }
            Ok(Status::Partial) => {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(WSError::Handshake(HandshakeError::Incomplete));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(err) => return Err(WSError::Handshake(HandshakeError::MalformedRequest(err))),
        }
    }
}

/// Builds the GET request and a fresh `Sec-WebSocket-Key`, ready for
/// `client_handshake`.
pub(crate) fn prepare_client_request(ws_url: &str) -> Result<(Vec<u8>, String, String, bool), WSError> {
    let key = generate_websocket_key();
    let parts = build_client_request(ws_url, &key)?;
    Ok((parts.request_bytes, parts.host_with_port, key, parts.use_tls))
}

/// Performs the server side of the handshake: reads the request, invokes
/// `factory`, and writes the matching HTTP response. Returns the accepted
/// listener on success; on `NotFound`/`Error` the response has already been
/// written and the caller should close the socket.
pub(crate) async fn server_handshake<S, F, L>(
    stream: &mut S,
    config: &ServerConfig,
    factory: F,
) -> Result<Option<(L, UpgradeRequest)>, WSError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(UpgradeRequest) -> FactoryOutcome<L>,
{
    let result = timeout(
        config.web_socket_config.handshake_timeout,
        server_handshake_inner(stream, config, factory),
    )
    .await
    .map_err(|_| WSError::Timeout);

    match result {
        Ok(inner) => inner,
        Err(timeout_err) => {
            let _ = write_response(stream, "400 Bad Request", &[]).await;
            Err(timeout_err)
        }
    }
}

async fn server_handshake_inner<S, F, L>(
    stream: &mut S,
    config: &ServerConfig,
    factory: F,
) -> Result<Option<(L, UpgradeRequest)>, WSError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(UpgradeRequest) -> FactoryOutcome<L>,
{
    let request = match read_upgrade_request(stream, config.web_socket_config.max_header_bytes).await {
        Ok(request) => request,
        Err(err) => {
            debug!("malformed handshake request: {err}");
            write_response(stream, "400 Bad Request", &[]).await?;
            return Err(err);
        }
    };

    let key = match request.header("sec-websocket-key") {
        Some(key) => key.to_string(),
        None => {
            write_response(stream, "400 Bad Request", &[]).await?;
            return Err(WSError::Handshake(HandshakeError::MissingSecWebSocketKey));
        }
    };

    // Mirrors the listener-callback dispatch in transport.rs: a factory that
    // panics must still produce a response rather than leaving the peer
    // hanging on a half-finished handshake (spec.md §4.2).
    let outcome = match catch_unwind(AssertUnwindSafe(|| factory(request.clone()))) {
        Ok(outcome) => outcome,
        Err(panic) => FactoryOutcome::Error(panic_message(panic)),
    };

    match outcome {
        FactoryOutcome::Accept(listener) => {
            let accept = generate_accept_value(&key);
            write_response(
                stream,
                "101 Switching Protocols",
                &[
                    ("Upgrade", "websocket"),
                    ("Connection", "Upgrade"),
                    ("Sec-WebSocket-Accept", &accept),
                ],
            )
            .await?;
            Ok(Some((listener, request)))
        }
        FactoryOutcome::NotFound => {
            write_response(stream, "404 Not Found", &[]).await?;
            Ok(None)
        }
        FactoryOutcome::Error(reason) => {
            warn!("connection factory failed: {reason}");
            write_response(stream, "500 Internal Server Error", &[]).await?;
            Ok(None)
        }
    }
}

async fn write_response<S>(stream: &mut S, status_line: &str, headers: &[(&str, &str)]) -> Result<(), WSError>
where
    S: AsyncWrite + Unpin,
{
    let mut response = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        response.push_str(name);
        response.push_str(": ");
        response.push_str(value);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
