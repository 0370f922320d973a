use crate::rudp::config::RudpConfig;
use crate::rudp::error::RudpResult;
use crate::rudp::fragmentation::{fragment, fragment_index};
use crate::rudp::handshake::{perform_handshake, ClientHandshake};
use crate::rudp::packet::{Datagram, PacketKind, MAX_DATAGRAM_LEN};
use crate::rudp::send_socket::SendPipeline;
use bytes::Bytes;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn, Instrument};

/// The client side of the protocol: sends a single request to a peer (through the relay) and
///  waits for the response.
pub struct ReliableSender {
    config: Arc<RudpConfig>,
}

impl ReliableSender {
    pub fn new(config: Arc<RudpConfig>) -> ReliableSender {
        ReliableSender { config }
    }

    /// Returns `Ok(None)` if no response arrives in time. Handshake failures and local I/O errors
    ///  are returned as errors, lost fragments are recovered based on the server's NAKs.
    pub async fn send_request(&self, peer: SocketAddrV4, request: &[u8]) -> RudpResult<Option<Bytes>> {
        let relay_addr = self.config.relay_addr;

        let socket = Arc::new(UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?);
        debug!("sending request of {} bytes to {} via relay {:?} from {:?}", request.len(), peer, relay_addr, socket.local_addr()?);
        let send_pipeline = Arc::new(SendPipeline::new(Arc::new(socket.clone()), self.config.write_timeout));

        let fragments = Arc::new(fragment(request, peer));

        let mut handshake = ClientHandshake::new(peer, fragments.len() as u32);
        perform_handshake(&socket, &send_pipeline, relay_addr, &mut handshake, &self.config).await?;

        let (nak_sender, nak_receiver) = mpsc::channel(fragments.len().max(16));
        let retransmitter = tokio::spawn(
            Self::retransmit_loop(nak_receiver, fragments.clone(), send_pipeline.clone(), relay_addr)
                .in_current_span()
        );

        for f in fragments.iter() {
            if let Err(e) = send_pipeline.send_datagram(relay_addr, f).await {
                // the server NAKs the gap
                warn!("error sending fragment #{}: {}", f.sequence_number, e);
            }
        }

        let result = self.await_response(&socket, relay_addr, &nak_sender).await;

        drop(nak_sender);
        retransmitter.abort();
        Ok(result)
    }

    async fn await_response(&self, socket: &UdpSocket, relay_addr: SocketAddr, nak_sender: &mpsc::Sender<u32>) -> Option<Bytes> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            let (len, from) = match timeout(self.config.response_timeout, socket.recv_from(&mut buf)).await {
                Err(_) => {
                    debug!("no response within {:?}", self.config.response_timeout);
                    return None;
                }
                Ok(Err(e)) => {
                    debug!("error receiving response: {}", e);
                    return None;
                }
                Ok(Ok(x)) => x,
            };
            if from != relay_addr {
                trace!("ignoring datagram from {:?} which is not the relay", from);
                continue;
            }

            let datagram = match Datagram::decode(&buf[..len]) {
                Ok(d) => d,
                Err(e) => {
                    debug!("dropping datagram: {}", e);
                    continue;
                }
            };

            match datagram.packet_kind() {
                Some(PacketKind::Data) => {
                    debug!("received response of {} bytes", datagram.payload.len());
                    return Some(datagram.payload);
                }
                Some(PacketKind::Ack) => trace!("fragment #{} acknowledged", datagram.sequence_number),
                Some(PacketKind::Nak) => {
                    if nak_sender.try_send(datagram.sequence_number).is_err() {
                        debug!("retransmission backlog is full - dropping NAK for #{}", datagram.sequence_number);
                    }
                }
                _ => trace!("ignoring {:?}", datagram),
            }
        }
    }

    async fn retransmit_loop(mut naks: mpsc::Receiver<u32>, fragments: Arc<Vec<Datagram>>, send_pipeline: Arc<SendPipeline>, relay_addr: SocketAddr) {
        while let Some(sequence_number) = naks.recv().await {
            match fragment_index(sequence_number).and_then(|idx| fragments.get(idx)) {
                Some(f) => {
                    debug!("NAK for #{} - retransmitting", sequence_number);
                    if let Err(e) = send_pipeline.send_datagram(relay_addr, f).await {
                        warn!("error retransmitting fragment #{}: {}", sequence_number, e);
                    }
                }
                None => debug!("NAK for unknown fragment #{} - ignoring", sequence_number),
            }
        }
    }
}
