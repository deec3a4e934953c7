use log::*;
use pki_types::{CertificateDer, PrivateKeyDer};
use ripple_ws::config::ServerConfig;
use ripple_ws::listener::FactoryOutcome;
use ripple_ws::{ws_create_server, WSFrame, WSListener, WSTransport};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;

struct Echo;

impl WSListener for Echo {
    fn on_ws_frame(&mut self, transport: &WSTransport, frame: &WSFrame) {
        if transport
            .send(frame.msg_type, &frame.payload, frame.fin, frame.rsv1)
            .is_err()
        {
            error!("failed to echo frame");
        }
    }
}

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    private_key(&mut BufReader::new(File::open(path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "no private key found"))
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let certs = load_certs(Path::new("server.crt"))?;
    let key = load_key(Path::new("server.key"))?;
    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let mut config = ServerConfig::default();
    config.tls_config = Some(Arc::new(tls_config));

    let server = ws_create_server(
        |_req| FactoryOutcome::Accept(Echo),
        "127.0.0.1",
        9002,
        config,
    )
    .await?;

    info!("listening on {} (tls)", server.local_addr());
    std::future::pending::<()>().await;
    Ok(())
}
