use crate::rudp::packet::{Datagram, MAX_DATAGRAM_LEN};
use crate::rudp::peer_addr::to_peer_addr;
use crate::rudp::send_socket::SendPipeline;
use anyhow::bail;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

/// Forwards datagrams between peers based on their in-band peer address, replacing it with the
///  sender's address on the way. A client addresses the server it wants to talk to, and the
///  server sees the client's address in the datagrams it receives, and vice versa.
///
/// Datagrams can be dropped at random to simulate a lossy network.
pub struct Relay {
    socket: Arc<UdpSocket>,
    send_pipeline: SendPipeline,
    drop_rate: f64,
    cancel_sender: broadcast::Sender<()>,
}

impl Relay {
    pub async fn bind(addr: SocketAddr, drop_rate: f64) -> anyhow::Result<Relay> {
        if !(0.0..=1.0).contains(&drop_rate) {
            bail!("drop rate must be between 0 and 1, was {}", drop_rate);
        }

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("relay bound to {:?}, dropping {:.0}% of datagrams", socket.local_addr()?, drop_rate * 100.0);

        let (cancel_sender, _) = broadcast::channel(1);
        Ok(Relay {
            send_pipeline: SendPipeline::new(Arc::new(socket.clone()), Duration::from_secs(1)),
            socket,
            drop_rate,
            cancel_sender,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stop(&self) {
        match self.cancel_sender.send(()) {
            Ok(_) => info!("stopping relay"),
            Err(_) => debug!("call to stop while the relay is not running"),
        }
    }

    pub async fn run(&self) {
        let mut cancel_receiver = self.cancel_sender.subscribe();
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, from)) => self.forward(&buf[..len], from).await,
                        Err(e) => error!("socket error: {}", e),
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }
    }

    async fn forward(&self, raw: &[u8], from: SocketAddr) {
        let mut datagram = match Datagram::decode(raw) {
            Ok(d) => d,
            Err(e) => {
                debug!("{} from {:?} - dropping", e, from);
                return;
            }
        };

        if self.drop_rate > 0.0 && rand::random::<f64>() < self.drop_rate {
            debug!("dropping {:?} from {:?}", datagram, from);
            return;
        }

        let to = SocketAddr::V4(datagram.peer);
        datagram.peer = match to_peer_addr(from) {
            Ok(addr) => addr,
            Err(e) => {
                debug!("{} - dropping", e);
                return;
            }
        };

        trace!("forwarding {:?} from {:?} to {:?}", datagram, from, to);
        if let Err(e) = self.send_pipeline.send_datagram(to, &datagram).await {
            debug!("error forwarding to {:?}: {}", to, e);
        }
    }
}
