use std::time::{Duration, Instant};

use ripple_ws::config::ClientConfig;
use ripple_ws::{ws_connect, WSFrame, WSListener, WSMsgType, WSTransport};
use tokio::sync::mpsc;

/// Forwards every received frame's payload length onto an unbounded
/// channel so the benchmark loop (which owns no handle into the listener
/// beyond `Arc<Mutex<_>>`) can wait for the echo without polling.
struct EchoTimer {
    replies: mpsc::UnboundedSender<()>,
}

impl WSListener for EchoTimer {
    fn on_ws_frame(&mut self, _transport: &WSTransport, _frame: &WSFrame) {
        let _ = self.replies.send(());
    }
}

#[tokio::main]
async fn main() {
    let url = "ws://127.0.0.1:9002/";
    let connection_count = 100; // Number of WebSocket clients
    let message_count = 1000; // Messages per client
    let message_size = 16384; // Size of each message in bytes

    let (tx, mut rx) = mpsc::unbounded_channel();

    for _ in 0..connection_count {
        let tx = tx.clone();
        tokio::spawn(async move {
            let (replies_tx, mut replies_rx) = mpsc::unbounded_channel();
            let (transport, _listener) =
                ws_connect(|| EchoTimer { replies: replies_tx }, url, ClientConfig::default())
                    .await
                    .expect("handshake failed");

            let payload = vec![b'a'; message_size];
            let start = Instant::now();

            for _ in 0..message_count {
                transport
                    .send(WSMsgType::Binary, &payload, true, false)
                    .expect("send failed");
                replies_rx.recv().await.expect("connection closed early");
            }

            let duration = start.elapsed();
            tx.send(duration).unwrap();
        });
    }

    drop(tx); // Close the channel

    let mut total_duration = Duration::new(0, 0);
    while let Some(duration) = rx.recv().await {
        total_duration += duration;
    }

    let avg_latency = total_duration / (connection_count as u32 * message_count as u32);
    println!("Average Latency: {:?}", avg_latency);
}
