use log::*;
use ripple_ws::config::ServerConfig;
use ripple_ws::listener::FactoryOutcome;
use ripple_ws::{ws_create_server, WSFrame, WSListener, WSTransport};

struct Echo;

impl WSListener for Echo {
    fn on_ws_connected(&mut self, _transport: &WSTransport) {
        info!("client connected");
    }

    fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
        if transport
            .send(frame.msg_type, &frame.payload, frame.fin, frame.rsv1)
            .is_err()
        {
            error!("failed to echo frame");
        }
    }

    fn on_ws_disconnected(&mut self, _transport: &WSTransport) {
        info!("client disconnected");
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(Echo),
        "127.0.0.1",
        9002,
        ServerConfig::default(),
    )
    .await?;

    info!("listening on {}", server.local_addr());
    std::future::pending::<()>().await;
    Ok(())
}
