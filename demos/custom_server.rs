use log::*;
use ripple_ws::config::ServerConfig;
use ripple_ws::listener::FactoryOutcome;
use ripple_ws::{ws_create_server, WSFrame, WSListener, WSTransport};

struct Chat;

impl WSListener for Chat {
    fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
        let _ = transport.send(frame.msg_type, &frame.payload, frame.fin, frame.rsv1);
    }
}

/// Demonstrates routing on the upgrade request's path: only `/chat` is
/// accepted, everything else gets `404 Not Found` before the socket closes.
#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let server = ws_create_server(
        |req| {
            if req.path.starts_with("/chat") {
                FactoryOutcome::Accept(Chat)
            } else {
                FactoryOutcome::NotFound
            }
        },
        "127.0.0.1",
        9000,
        ServerConfig::default(),
    )
    .await?;

    info!("listening on {}, routes: /chat", server.local_addr());
    std::future::pending::<()>().await;
    Ok(())
}
