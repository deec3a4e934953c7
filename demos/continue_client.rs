use log::*;
use ripple_ws::config::ClientConfig;
use ripple_ws::{ws_connect, WSListener, WSMsgType};

struct NoopListener;
impl WSListener for NoopListener {}

/// Demonstrates sending one TEXT message as several fragments: a TEXT frame
/// with `fin=false`, followed by CONTINUATION frames, the last with
/// `fin=true`. Message reassembly on the receiving side is the
/// application's concern, not the library's.
#[tokio::main]
async fn main() {
    env_logger::init();

    let (transport, _listener) =
        ws_connect(|| NoopListener, "ws://127.0.0.1:9002/", ClientConfig::default())
            .await
            .expect("handshake failed");

    let payload = b"the quick brown fox jumps over the lazy dog";
    let chunks: Vec<&[u8]> = payload.chunks(8).collect();

    for (i, chunk) in chunks.iter().enumerate() {
        let is_last = i == chunks.len() - 1;
        let msg_type = if i == 0 { WSMsgType::Text } else { WSMsgType::Continuation };
        if transport.send(msg_type, chunk, is_last, false).is_err() {
            error!("failed to send fragment {i}");
            return;
        }
    }

    transport
        .send_close(ripple_ws::WSCloseCode::Normal, b"")
        .ok();
    transport.wait_disconnected().await;
}
