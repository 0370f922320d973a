use crate::rudp::config::RudpConfig;
use crate::rudp::error::{RudpError, RudpResult};
use crate::rudp::packet::{Datagram, PacketKind, MAX_DATAGRAM_LEN, SYN_SEQUENCE_NUMBER};
use crate::rudp::send_socket::SendPipeline;
use std::net::{SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

/// Sequence number of the client's (informational) ACK that concludes the handshake
pub const HANDSHAKE_ACK_SEQUENCE_NUMBER: u32 = SYN_SEQUENCE_NUMBER + 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClientHandshakeState {
    Idle,
    SynSent { attempt: usize },
    Established,
}

/// The client's side of the handshake. This is the pure state machine, the I/O is done by
///  [perform_handshake].
pub struct ClientHandshake {
    peer: SocketAddrV4,
    num_fragments: u32,
    state: ClientHandshakeState,
}

impl ClientHandshake {
    pub fn new(peer: SocketAddrV4, num_fragments: u32) -> ClientHandshake {
        ClientHandshake {
            peer,
            num_fragments,
            state: ClientHandshakeState::Idle,
        }
    }

    pub fn state(&self) -> ClientHandshakeState {
        self.state
    }

    /// Create the (next) SYN datagram, counting it as an attempt
    pub fn syn(&mut self) -> Datagram {
        let attempt = match self.state {
            ClientHandshakeState::SynSent { attempt } => attempt + 1,
            _ => 1,
        };
        self.state = ClientHandshakeState::SynSent { attempt };
        Datagram::new(PacketKind::Syn, SYN_SEQUENCE_NUMBER, self.peer, self.num_fragments.to_string().into_bytes())
    }

    /// Returns `true` if the datagram is the expected SYN-ACK, which establishes the handshake.
    ///  Everything else is ignored.
    pub fn on_datagram(&mut self, datagram: &Datagram) -> bool {
        if !matches!(self.state, ClientHandshakeState::SynSent { .. }) {
            return false;
        }
        if datagram.packet_kind() != Some(PacketKind::SynAck) {
            trace!("waiting for SYN_ACK, ignoring {:?}", datagram);
            return false;
        }
        if datagram.sequence_number != SYN_SEQUENCE_NUMBER.wrapping_add(1) {
            debug!("SYN_ACK with unexpected sequence number {} - ignoring", datagram.sequence_number);
            return false;
        }

        self.state = ClientHandshakeState::Established;
        true
    }

    pub fn ack(&self) -> Datagram {
        Datagram::control(PacketKind::Ack, HANDSHAKE_ACK_SEQUENCE_NUMBER, self.peer)
    }
}

/// Run the client handshake over `socket`, writing through `pipeline` to the relay.
///
/// The SYN is re-sent if no valid SYN-ACK arrives within the handshake timeout, up to the
///  configured number of attempts. A failed write counts as a failed attempt.
pub async fn perform_handshake(
    socket: &UdpSocket,
    pipeline: &SendPipeline,
    relay_addr: SocketAddr,
    handshake: &mut ClientHandshake,
    config: &RudpConfig,
) -> RudpResult<()> {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];

    for _ in 0..config.handshake_max_attempts {
        let syn = handshake.syn();
        debug!("sending SYN ({:?})", handshake.state());
        if let Err(e) = pipeline.send_datagram(relay_addr, &syn).await {
            warn!("error sending SYN: {}", e);
            continue;
        }

        let deadline = Instant::now() + config.handshake_timeout;
        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => {
                    debug!("no SYN_ACK within {:?}", config.handshake_timeout);
                    break;
                }
                Ok(Err(e)) => {
                    debug!("error receiving SYN_ACK: {}", e);
                    continue;
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

            if handshake.on_datagram(&datagram) {
                debug!("handshake established");
                // the server does not need this, it treats the first DATA fragment as the ACK
                if let Err(e) = pipeline.send_datagram(relay_addr, &handshake.ack()).await {
                    debug!("error sending handshake ACK: {}", e);
                }
                return Ok(());
            }
        }
    }

    Err(RudpError::HandshakeFailed { attempts: config.handshake_max_attempts })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerHandshakeState {
    Idle,
    SynReceived { total_fragments: u32 },
    /// the first DATA fragment arrived after a SYN
    Established { total_fragments: u32 },
}

impl ServerHandshakeState {
    pub fn total_fragments(&self) -> Option<u32> {
        match *self {
            ServerHandshakeState::Idle => None,
            ServerHandshakeState::SynReceived { total_fragments } => Some(total_fragments),
            ServerHandshakeState::Established { total_fragments } => Some(total_fragments),
        }
    }
}

/// Parse a SYN's fragment count and create the matching SYN-ACK. The SYN-ACK is addressed to the
///  same peer as the SYN.
pub fn accept_syn(syn: &Datagram, max_fragments: u32) -> RudpResult<(u32, Datagram)> {
    let raw = String::from_utf8_lossy(&syn.payload);
    let total_fragments = raw.trim().parse::<u32>()
        .map_err(|_| RudpError::CorruptHandshakePayload(raw.to_string()))?;
    if total_fragments == 0 || total_fragments > max_fragments {
        return Err(RudpError::CorruptHandshakePayload(raw.to_string()));
    }

    let syn_ack = Datagram::control(PacketKind::SynAck, syn.sequence_number.wrapping_add(1), syn.peer);
    Ok((total_fragments, syn_ack))
}
