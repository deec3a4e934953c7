use log::*;
use ripple_ws::config::ClientConfig;
use ripple_ws::{ws_connect, WSFrame, WSListener, WSMsgType, WSTransport};
use tokio::time::{interval, Duration};

struct Printer;

impl WSListener for Printer {
    fn on_ws_frame(&mut self, _transport: &WSTransport, frame: &WSFrame) {
        match frame.as_utf8_text() {
            Ok(text) => info!("received: {text}"),
            Err(_) => info!("received {} binary bytes", frame.payload.len()),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    // Uses the default client TLS config (webpki-roots trust store). Pass a
    // custom `tls_config` on `ClientConfig` to pin a private CA instead.
    let config = ClientConfig::default();
    let (transport, _listener) = ws_connect(|| Printer, "wss://127.0.0.1:9002/", config)
        .await
        .expect("handshake failed");

    let mut ticker = interval(Duration::from_secs(5));
    for i in 0..3 {
        ticker.tick().await;
        let message = format!("hello over tls #{i}");
        if transport
            .send(WSMsgType::Text, message.as_bytes(), true, false)
            .is_err()
        {
            error!("failed to send message");
            break;
        }
    }

    transport
        .send_close(ripple_ws::WSCloseCode::Normal, b"bye")
        .ok();
    transport.wait_disconnected().await;
}
