use log::*;
use ripple_ws::config::{ServerConfig, WebSocketConfig};
use ripple_ws::listener::FactoryOutcome;
use ripple_ws::{ws_create_server, WSFrame, WSListener, WSTransport};

/// A listener that panics on any frame whose payload is the literal string
/// `"boom"`. Run with `disconnect_on_exception = true` (the default) and the
/// panic is caught, logged, and the connection is forced closed with
/// `WSCloseCode::InternalError`; with it set to `false` the panic is merely
/// logged and the connection stays open for the next frame.
struct Flaky;

impl WSListener for Flaky {
    fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
        if &frame.payload[..] == b"boom" {
            panic!("simulated listener failure");
        }
        let _ = transport.send(frame.msg_type, &frame.payload, frame.fin, frame.rsv1);
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let web_socket_config = WebSocketConfig {
        disconnect_on_exception: false,
        ..WebSocketConfig::default()
    };
    let config = ServerConfig {
        web_socket_config,
        ..ServerConfig::default()
    };

    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(Flaky),
        "127.0.0.1",
        9003,
        config,
    )
    .await?;

    info!(
        "listening on {} (disconnect_on_exception=false)",
        server.local_addr()
    );
    std::future::pending::<()>().await;
    Ok(())
}
