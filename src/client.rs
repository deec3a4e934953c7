//! Client entry point: `ws_connect`.
//!
//! Grounded on the teacher's `connect_async`/`connect_async_with_config`
//! naming convention and its `construct_http_request` + TCP-connect shape,
//! generalized to the listener-returning signature spec.md §6 specifies
//! (the teacher returns a `Stream`-wrapping `WSConnection`; this crate
//! returns a `WSTransport` handle plus a shared handle to the listener so
//! the caller can still inspect its state after handing ownership to the
//! connection's driver task).

use std::sync::{Arc, Mutex};

use pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::ClientConfig;
use crate::connection::Role;
use crate::error::WSError;
use crate::frame::WSFrame;
use crate::handshake::{client_handshake, prepare_client_request};
use crate::listener::WSListener;
use crate::stream::WsStream;
use crate::transport::{self, WSTransport};

/// Forwards every callback to a listener shared behind a `Mutex` so the
/// caller of `ws_connect` keeps a handle to it after the driver task takes
/// ownership of this adapter. The lock is only ever held for the duration
/// of one synchronous callback, never across an `.await`.
struct SharedListener<L> {
    inner: Arc<Mutex<L>>,
}

impl<L: WSListener> WSListener for SharedListener<L> {
    fn on_ws_connected(&mut self, transport: &WSTransport) {
        self.inner.lock().unwrap().on_ws_connected(transport);
    }

    fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
        self.inner.lock().unwrap().on_ws_frame(transport, frame);
    }

    fn pause_writing(&mut self) {
        self.inner.lock().unwrap().pause_writing();
    }

    fn resume_writing(&mut self) {
        self.inner.lock().unwrap().resume_writing();
    }

    fn on_ws_disconnected(&mut self, transport: &WSTransport) {
        self.inner.lock().unwrap().on_ws_disconnected(transport);
    }
}

/// Connects to `url` (`ws://` or `wss://`), performs the client handshake
/// (§4.2, bounded by `config.web_socket_config.handshake_timeout`), and
/// spawns the connection's read/write tasks. `listener_ctor` is invoked
/// once the TCP connection is established, before the handshake begins.
pub async fn ws_connect<F, L>(
    listener_ctor: F,
    url: &str,
    config: ClientConfig,
) -> Result<(WSTransport, Arc<Mutex<L>>), WSError>
where
    F: FnOnce() -> L,
    L: WSListener + 'static,
{
    let (request_bytes, host_with_port, key, use_tls) = prepare_client_request(url)?;

    let tcp = TcpStream::connect(&host_with_port).await?;
    tcp.set_nodelay(true).ok();

    let mut socket = if use_tls {
        let tls_config = config
            .tls_config
            .clone()
            .unwrap_or_else(default_client_tls_config);
        let connector = TlsConnector::from(tls_config);
        let host = host_with_port
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&host_with_port)
            .to_string();
        let server_name = ServerName::try_from(host)
            .map_err(|_| WSError::Internal("invalid TLS server name"))?;
        let tls_stream = connector.connect(server_name, tcp).await?;
        WsStream::Rustls(Box::new(tokio_rustls::TlsStream::Client(tls_stream)))
    } else {
        WsStream::Plain(tcp)
    };

    client_handshake(&mut socket, &request_bytes, &key, &config).await?;

    let listener = Arc::new(Mutex::new(listener_ctor()));
    let shared = SharedListener { inner: listener.clone() };
    let transport = transport::spawn(socket, Role::Client, config.web_socket_config, shared);

    Ok((transport, listener))
}

fn default_client_tls_config() -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}
