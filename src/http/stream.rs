use crate::http::handler::{handle_raw_request, RequestHandler};
use crate::http::message::expected_request_len;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, Instrument};

/// Sends a raw request over a new TCP connection and reads the response until the server closes
///  the connection
pub async fn stream_request(host_port: &str, request: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(host_port).await?;
    debug!("connected to {} from {:?}", host_port, stream.local_addr()?);

    stream.write_all(request).await?;
    stream.shutdown().await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    debug!("received {} bytes from {}", response.len(), host_port);
    Ok(response)
}

/// A TCP server handling one request per connection
pub struct StreamServer {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    cancel_sender: broadcast::Sender<()>,
}

impl StreamServer {
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn RequestHandler>) -> anyhow::Result<StreamServer> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {:?}", listener.local_addr()?);

        let (cancel_sender, _) = broadcast::channel(1);
        Ok(StreamServer {
            listener,
            handler,
            cancel_sender,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stop(&self) {
        match self.cancel_sender.send(()) {
            Ok(_) => info!("stopping accept loop"),
            Err(_) => debug!("call to stop while no accept loop is running"),
        }
    }

    pub async fn accept_loop(&self) {
        let mut cancel_receiver = self.cancel_sender.subscribe();
        loop {
            tokio::select! {
                r = self.listener.accept() => {
                    match r {
                        Ok((stream, peer)) => {
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handler.as_ref()).await {
                                    debug!("error handling connection: {}", e);
                                }
                            }.instrument(info_span!("connection", ?peer)));
                        }
                        Err(e) => error!("error accepting connection: {}", e),
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, handler: &dyn RequestHandler) -> anyhow::Result<()> {
    debug!("handling client");

    let request = read_request(&mut stream).await?;
    let response = handle_raw_request(handler, &request).await;

    stream.write_all(&response).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Reads until the request is complete according to its `Content-Length`, or until the client
///  closes its side of the connection
async fn read_request(stream: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(len) = expected_request_len(&buf) {
            if buf.len() >= len {
                buf.truncate(len);
                return Ok(buf);
            }
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
