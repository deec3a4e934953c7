//! The byte-stream union the transport reads and writes through.
//!
//! Grounded on the call sites in the teacher's `server.rs`/`read.rs`/
//! `write.rs`, which pattern-match on a `SocketFlowStream::{Plain,Secure}`
//! enum that the teacher's own `stream.rs` snapshot never defines (see
//! DESIGN.md). Rebuilt here as `WsStream`, with the shape those call sites
//! imply: a plain `TcpStream` variant and a TLS variant wrapping
//! `tokio_rustls`'s `TlsStream`, which is itself generic over client/server
//! so one variant covers both handshake roles.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsStream;

#[cfg(feature = "feature-native-tls")]
use tokio_native_tls::TlsStream as NativeTlsStream;

/// A TCP stream, optionally wrapped in a TLS session. Exposed as a single
/// type so the read/write tasks in `transport.rs` don't need to be generic
/// over the handshake's transport kind.
pub enum WsStream {
    Plain(TcpStream),
    Rustls(Box<TlsStream<TcpStream>>),
    #[cfg(feature = "feature-native-tls")]
    NativeTls(Box<NativeTlsStream<TcpStream>>),
}

impl WsStream {
    pub fn is_secure(&self) -> bool {
        match self {
            WsStream::Plain(_) => false,
            WsStream::Rustls(_) => true,
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(_) => true,
        }
    }

    /// Sets `TCP_NODELAY` on the underlying socket, reaching through the
    /// TLS wrapper when one is present.
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        match self {
            WsStream::Plain(stream) => stream.set_nodelay(nodelay),
            WsStream::Rustls(stream) => stream.get_ref().0.set_nodelay(nodelay),
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(stream) => {
                stream.get_ref().get_ref().get_ref().set_nodelay(nodelay)
            }
        }
    }
}

impl AsyncRead for WsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            WsStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            WsStream::Rustls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for WsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            WsStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            WsStream::Rustls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            WsStream::Plain(stream) => Pin::new(stream).poll_write_vectored(cx, bufs),
            WsStream::Rustls(stream) => Pin::new(stream.as_mut()).poll_write_vectored(cx, bufs),
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(stream) => Pin::new(stream.as_mut()).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            WsStream::Plain(stream) => stream.is_write_vectored(),
            WsStream::Rustls(stream) => stream.is_write_vectored(),
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(stream) => stream.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            WsStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            WsStream::Rustls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            WsStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            WsStream::Rustls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            #[cfg(feature = "feature-native-tls")]
            WsStream::NativeTls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
