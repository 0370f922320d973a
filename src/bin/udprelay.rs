use clap::Parser;
use std::net::SocketAddr;
use tracing::Level;
use udphttp::rudp::relay::Relay;

/// Forwards datagrams between clients and servers, optionally dropping some of them
#[derive(Parser)]
#[command(name = "udprelay")]
struct Args {
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(long, default_value_t = false)]
    very_verbose: bool,

    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Probability (0 to 1) for dropping each datagram
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,
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

    let relay = Relay::bind(SocketAddr::from(([0, 0, 0, 0], args.port)), args.drop_rate).await?;
    relay.run().await;
    Ok(())
}
