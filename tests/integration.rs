//! End-to-end tests driving real loopback TCP servers and clients, per
//! spec.md §8's testable properties. These exercise the public API only —
//! no internal module is reached into directly.

use std::time::Duration;

use ripple_ws::config::{ClientConfig, ServerConfig, WebSocketConfig};
use ripple_ws::listener::FactoryOutcome;
use ripple_ws::{ws_connect, ws_create_server, WSCloseCode, WSFrame, WSListener, WSMsgType, WSTransport};
use tokio::sync::mpsc;

struct EchoListener;
impl WSListener for EchoListener {
    fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
        let _ = transport.send(frame.msg_type, &frame.payload, frame.fin, frame.rsv1);
    }
}

/// Forwards every received frame onto a channel, for assertions in the
/// test body, which runs on a different task than the listener callbacks.
struct CollectingListener {
    tx: mpsc::UnboundedSender<WSFrame>,
}
impl WSListener for CollectingListener {
    fn on_ws_frame(&mut self, _transport: &WSTransport, frame: &WSFrame) {
        let _ = self.tx.send(frame.clone());
    }
}

async fn spawn_echo_server() -> std::net::SocketAddr {
    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(EchoListener),
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();
    // Leak the server for the test process's lifetime; each test binds its
    // own ephemeral port, so there's no cross-test interference.
    std::mem::forget(server);
    addr
}

async fn connect_collecting(addr: std::net::SocketAddr) -> (WSTransport, mpsc::UnboundedReceiver<WSFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (transport, _listener) = ws_connect(
        || CollectingListener { tx },
        &format!("ws://{addr}/"),
        ClientConfig::default(),
    )
    .await
    .unwrap();
    (transport, rx)
}

async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<WSFrame>) -> WSFrame {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("channel closed before a frame arrived")
}

#[tokio::test]
async fn round_trips_payloads_of_various_sizes() {
    let addr = spawn_echo_server().await;
    let (transport, mut rx) = connect_collecting(addr).await;

    for size in [0usize, 1, 8, 64, 262_144] {
        let payload = vec![7u8; size];
        transport
            .send(WSMsgType::Binary, &payload, true, false)
            .unwrap();
        let frame = recv_frame(&mut rx).await;
        assert_eq!(frame.msg_type, WSMsgType::Binary);
        assert!(frame.fin);
        assert!(!frame.rsv1);
        assert_eq!(&frame.payload[..], &payload[..]);
    }
}

#[tokio::test]
async fn close_echo_preserves_code_and_reason() {
    let addr = spawn_echo_server().await;
    let (transport, mut rx) = connect_collecting(addr).await;

    transport
        .send_close(WSCloseCode::GoingAway, b"goodbye")
        .unwrap();

    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame.msg_type, WSMsgType::Close);
    assert_eq!(frame.close_code(), WSCloseCode::GoingAway);
    assert_eq!(&frame.close_message()[..], b"goodbye");

    tokio::time::timeout(Duration::from_secs(2), transport.wait_disconnected())
        .await
        .unwrap();

    // `EchoListener` echoes the inbound CLOSE back through the generic
    // `send` path, exactly like `demos/echo_server.rs`. That must not put a
    // second CLOSE frame on the wire (spec.md §3: one CLOSE per direction).
    assert!(
        rx.try_recv().is_err(),
        "server must not have sent a second CLOSE frame"
    );
}

#[tokio::test]
async fn echoed_close_frame_is_not_duplicated() {
    // A listener that reacts to an inbound CLOSE by calling `send_close`
    // itself (rather than relying on the generic echo path) must also only
    // ever put one CLOSE frame on the wire per direction.
    struct ClosingListener;
    impl WSListener for ClosingListener {
        fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
            if frame.msg_type == WSMsgType::Close {
                let _ = transport.send_close(frame.close_code(), b"");
                let _ = transport.send_close(WSCloseCode::Normal, b"should be a no-op");
            }
        }
    }

    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(ClosingListener),
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let (transport, mut rx) = connect_collecting(addr).await;
    transport
        .send_close(WSCloseCode::GoingAway, b"bye")
        .unwrap();

    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame.msg_type, WSMsgType::Close);

    tokio::time::timeout(Duration::from_secs(2), transport.wait_disconnected())
        .await
        .unwrap();
    assert!(rx.try_recv().is_err(), "only one CLOSE frame should arrive");
}

#[tokio::test]
async fn ping_is_answered_with_pong_carrying_same_payload() {
    let addr = spawn_echo_server().await;
    let (transport, mut rx) = connect_collecting(addr).await;

    transport.send_ping(b"marco").unwrap();

    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame.msg_type, WSMsgType::Pong);
    assert_eq!(&frame.payload[..], b"marco");
}

#[tokio::test]
async fn frames_arrive_in_send_order() {
    let addr = spawn_echo_server().await;
    let (transport, mut rx) = connect_collecting(addr).await;

    for i in 0..20u8 {
        transport
            .send(WSMsgType::Binary, &[i], true, false)
            .unwrap();
    }

    for expected in 0..20u8 {
        let frame = recv_frame(&mut rx).await;
        assert_eq!(frame.payload[0], expected);
    }
}

#[tokio::test]
async fn factory_not_found_surfaces_404_to_client() {
    let server = ws_create_server(
        |_req: ripple_ws::UpgradeRequest| FactoryOutcome::<EchoListener>::NotFound,
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let err = ws_connect(|| EchoListener, &format!("ws://{addr}/"), ClientConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404 Not Found"));
}

#[tokio::test]
async fn factory_error_surfaces_500_to_client() {
    let server = ws_create_server(
        |_req: ripple_ws::UpgradeRequest| FactoryOutcome::<EchoListener>::Error("boom".into()),
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let err = ws_connect(|| EchoListener, &format!("ws://{addr}/"), ClientConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500 Internal Server Error"));
}

#[tokio::test]
async fn factory_panic_surfaces_500_to_client() {
    let server = ws_create_server(
        |_req: ripple_ws::UpgradeRequest| -> FactoryOutcome<EchoListener> {
            panic!("factory exploded")
        },
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let err = ws_connect(|| EchoListener, &format!("ws://{addr}/"), ClientConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500 Internal Server Error"));
}

#[tokio::test]
async fn malformed_request_bytes_yield_400_then_eof() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(EchoListener),
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(b"zzzz\r\nasdfasdf\r\n\r\n").await.unwrap();

    let mut response = vec![0u8; 256];
    let n = socket.read(&mut response).await.unwrap();
    let text = String::from_utf8_lossy(&response[..n]);
    assert!(text.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn client_handshake_times_out_against_silent_peer() {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and then never write a response.
        let _ = listener.accept().await;
        std::future::pending::<()>().await
    });

    let mut config = ClientConfig::default();
    config.web_socket_config.handshake_timeout = Duration::from_millis(50);

    let result = ws_connect(|| EchoListener, &format!("ws://{addr}/"), config).await;
    assert!(matches!(result, Err(ripple_ws::error::WSError::Timeout)));
}

#[tokio::test]
async fn path_and_query_are_preserved_exactly() {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let server = ws_create_server(
        move |req| {
            let _ = tx.send(req.path.clone());
            FactoryOutcome::Accept(EchoListener)
        },
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let url = format!("ws://{addr}/v1/ws?key=blablabla&data=fhhh");
    let _ = ws_connect(|| EchoListener, &url, ClientConfig::default())
        .await
        .unwrap();

    let path = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(path, "/v1/ws?key=blablabla&data=fhhh");
}

#[tokio::test]
async fn listener_panic_disconnects_when_disconnect_on_exception_is_true() {
    struct Flaky;
    impl WSListener for Flaky {
        fn on_ws_frame(&mut self, _transport: &WSTransport, frame: &WSFrame) {
            if &frame.payload[..] == b"boom" {
                panic!("simulated failure");
            }
        }
    }

    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(Flaky),
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let (transport, _listener) = ws_connect(|| EchoListener, &format!("ws://{addr}/"), ClientConfig::default())
        .await
        .unwrap();

    transport
        .send(WSMsgType::Binary, b"boom", true, false)
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), transport.wait_disconnected())
        .await
        .expect("connection should be forced closed after the listener panics");
}

#[tokio::test]
async fn listener_panic_sends_internal_error_close_frame_to_peer() {
    struct Flaky;
    impl WSListener for Flaky {
        fn on_ws_frame(&mut self, _transport: &WSTransport, frame: &WSFrame) {
            if &frame.payload[..] == b"boom" {
                panic!("simulated failure");
            }
        }
    }

    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(Flaky),
        "127.0.0.1",
        0,
        ServerConfig::default(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let (transport, mut rx) = connect_collecting(addr).await;
    transport
        .send(WSMsgType::Binary, b"boom", true, false)
        .unwrap();

    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame.msg_type, WSMsgType::Close);
    assert_eq!(frame.close_code(), WSCloseCode::InternalError);
}

#[tokio::test]
async fn listener_panic_leaves_connection_open_when_disconnect_on_exception_is_false() {
    struct Flaky;
    impl WSListener for Flaky {
        fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
            if &frame.payload[..] == b"boom" {
                panic!("simulated failure");
            }
            let _ = transport.send(frame.msg_type, &frame.payload, frame.fin, frame.rsv1);
        }
    }

    let config = ServerConfig {
        web_socket_config: WebSocketConfig {
            disconnect_on_exception: false,
            ..WebSocketConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(Flaky),
        "127.0.0.1",
        0,
        config,
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let (transport, mut rx) = connect_collecting(addr).await;
    transport
        .send(WSMsgType::Binary, b"boom", true, false)
        .unwrap();
    transport
        .send(WSMsgType::Binary, b"still alive", true, false)
        .unwrap();

    let frame = recv_frame(&mut rx).await;
    assert_eq!(&frame.payload[..], b"still alive");
}

#[tokio::test]
async fn backpressure_pause_precedes_resume_and_each_fires_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct WatermarkListener {
        pauses: Arc<AtomicUsize>,
        resumes: Arc<AtomicUsize>,
    }
    impl WSListener for WatermarkListener {
        fn pause_writing(&mut self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
        fn resume_writing(&mut self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }
    }

    let addr = spawn_echo_server().await;
    let pauses = Arc::new(AtomicUsize::new(0));
    let resumes = Arc::new(AtomicUsize::new(0));
    let listener_pauses = pauses.clone();
    let listener_resumes = resumes.clone();

    let (transport, _listener) = ws_connect(
        move || WatermarkListener {
            pauses: listener_pauses,
            resumes: listener_resumes,
        },
        &format!("ws://{addr}/"),
        ClientConfig::default(),
    )
    .await
    .unwrap();

    // Tune the watermarks down low enough that a handful of 4 KiB frames
    // cross the high watermark before the write task can drain them.
    transport.set_write_watermarks(64, 16);
    let payload = vec![0u8; 4096];
    for _ in 0..8 {
        transport
            .send(WSMsgType::Binary, &payload, true, false)
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(pauses.load(Ordering::SeqCst) <= 1);
    assert!(resumes.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn server_handshake_timeout_disconnects_silent_client() {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    let config = ServerConfig {
        web_socket_config: WebSocketConfig {
            handshake_timeout: Duration::from_millis(50),
            ..WebSocketConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(EchoListener),
        "127.0.0.1",
        0,
        config,
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    // Connect but never send the handshake request.
    let mut socket = TcpStream::connect(addr).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        let mut buf = [0u8; 256];
        loop {
            // Drain the "400 Bad Request" response, if any, until EOF.
            if socket.read(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await
    .expect("server should disconnect once the handshake timeout elapses");
}

#[tokio::test]
async fn config_default_enables_disconnect_on_exception() {
    let config = WebSocketConfig::default();
    assert!(config.disconnect_on_exception);
    assert_eq!(config.handshake_timeout, Duration::from_secs(5));
}
