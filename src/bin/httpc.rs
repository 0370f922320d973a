use anyhow::{anyhow, bail};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use udphttp::http::client::{HttpClient, Transport};
use udphttp::http::message::HttpResponse;
use udphttp::rudp::config::RudpConfig;

/// httpc is a curl-like application, but supports HTTP only
#[derive(Parser)]
#[command(name = "httpc")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Executes an HTTP GET request for a given URL
    #[command(disable_help_flag = true)]
    Get(CommonArgs),
    /// Executes an HTTP POST request for a given URL with inline data or from a file
    #[command(disable_help_flag = true)]
    Post(PostArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Prints the details of the response such as protocol, status and headers
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(long, default_value_t = false)]
    very_verbose: bool,

    /// Adds a header to the request, in the format 'key:value'
    #[arg(short = 'h', long = "header", value_name = "KEY:VALUE")]
    headers: Vec<String>,

    /// Writes the response to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sends the request over the reliable datagram protocol instead of TCP
    #[arg(long, default_value_t = false)]
    udp: bool,

    /// The relay that datagrams are sent through
    #[arg(long, default_value = "127.0.0.1:3000")]
    relay: SocketAddr,

    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    url: String,
}

#[derive(Args)]
struct PostArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Inline data for the request body
    #[arg(short, long, conflicts_with = "file")]
    data: Option<String>,

    /// A file whose content is the request body
    #[arg(short, long)]
    file: Option<PathBuf>,
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw.split_once(':')
        .ok_or_else(|| anyhow!("header {:?} is not in the format 'key:value'", raw))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn init_logging(args: &CommonArgs) {
    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::WARN,
    };

    // stdout is for the response
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn render(response: &HttpResponse, verbose: bool) -> Vec<u8> {
    let mut result = Vec::new();
    if verbose {
        result.extend_from_slice(response.head().as_bytes());
        result.extend_from_slice(b"\r\n\r\n");
    }
    result.extend_from_slice(&response.body);
    result
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (method, args, body) = match cli.command {
        Command::Get(args) => ("GET", args, Vec::new()),
        Command::Post(post) => {
            let body = match (post.data, post.file) {
                (Some(data), _) => data.into_bytes(),
                (None, Some(file)) => tokio::fs::read(&file).await
                    .map_err(|e| anyhow!("error reading {:?}: {}", file, e))?,
                (None, None) => Vec::new(),
            };
            ("POST", post.common, body)
        }
    };
    init_logging(&args);

    let headers = args.headers.iter()
        .map(|h| parse_header(h))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let transport = if args.udp {
        Transport::Datagram(Arc::new(RudpConfig::with_relay_addr(args.relay)))
    }
    else {
        Transport::Stream
    };

    let Some(response) = HttpClient::new(transport).request(method, &args.url, &headers, &body).await? else {
        bail!("no response received");
    };

    let rendered = render(&response, args.verbose);
    match &args.output {
        Some(path) => tokio::fs::write(path, rendered).await?,
        None => println!("{}", String::from_utf8_lossy(&rendered)),
    }
    Ok(())
}
