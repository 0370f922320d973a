use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use udphttp::http::file_server::FileServer;
use udphttp::http::stream::StreamServer;
use udphttp::rudp::config::RudpConfig;
use udphttp::rudp::end_point::RudpServer;

/// A simple file server
#[derive(Parser)]
#[command(name = "httpfs")]
struct Args {
    /// Prints debugging messages
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(long, default_value_t = false)]
    very_verbose: bool,

    /// The port the server listens on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// The directory the server reads and writes files in
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Serves the reliable datagram protocol instead of TCP
    #[arg(long, default_value_t = false)]
    udp: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let handler = Arc::new(FileServer::new(args.dir));
    info!("serving directory {:?} on port {} ({})", handler.root(), args.port, if args.udp { "UDP" } else { "TCP" });

    if args.udp {
        let server = RudpServer::bind(addr, Arc::new(RudpConfig::default()), handler).await?;
        server.recv_loop().await;
    }
    else {
        let server = StreamServer::bind(addr, handler).await?;
        server.accept_loop().await;
    }
    Ok(())
}
