use crate::http::handler::{handle_raw_request, RequestHandler};
use crate::rudp::config::RudpConfig;
use crate::rudp::fragmentation::{fragment_index, reassemble};
use crate::rudp::handshake::{accept_syn, ServerHandshakeState};
use crate::rudp::packet::{Datagram, PacketKind, FIRST_DATA_SEQUENCE_NUMBER, MAX_PAYLOAD_LEN, RESPONSE_SEQUENCE_NUMBER};
use crate::rudp::peer_addr::PeerKey;
use crate::rudp::send_socket::SendPipeline;
use bit_set::BitSet;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

/// A datagram for a session, together with the UDP source address it came from (i.e. the relay)
#[derive(Debug)]
pub struct SessionMessage {
    pub datagram: Datagram,
    pub from: SocketAddr,
}

#[derive(Debug, Default)]
pub struct SessionOutput {
    pub replies: Vec<Datagram>,
    /// The reassembled request. This is present in the output of exactly one datagram per
    ///  session.
    pub completed_request: Option<Vec<u8>>,
}

/// The sequencing and reassembly state of a single peer's session. This is pure bookkeeping
///  without I/O: every incoming datagram produces the datagrams to send in response.
pub struct SessionState {
    peer: PeerKey,
    max_fragments: u32,
    handshake: ServerHandshakeState,

    /// DATA fragments with lower sequence numbers were either received or NAK'ed
    expected_sequence_number: u32,
    /// indexed by fragment index, i.e. sequence number minus [FIRST_DATA_SEQUENCE_NUMBER]
    acknowledged: BitSet,
    /// Fragments that were NAK'ed and did not arrive yet
    negatively_acknowledged: BTreeSet<u32>,
    fragments: BTreeMap<u32, Bytes>,

    dispatched: bool,
}

impl SessionState {
    pub fn new(peer: PeerKey, max_fragments: u32) -> SessionState {
        SessionState {
            peer,
            max_fragments,
            handshake: ServerHandshakeState::Idle,
            expected_sequence_number: FIRST_DATA_SEQUENCE_NUMBER,
            acknowledged: BitSet::new(),
            negatively_acknowledged: BTreeSet::new(),
            fragments: BTreeMap::new(),
            dispatched: false,
        }
    }

    pub fn expected_sequence_number(&self) -> u32 {
        self.expected_sequence_number
    }

    pub fn total_fragments(&self) -> Option<u32> {
        self.handshake.total_fragments()
    }

    pub fn handshake_state(&self) -> ServerHandshakeState {
        self.handshake
    }

    pub fn is_negatively_acknowledged(&self, sequence_number: u32) -> bool {
        self.negatively_acknowledged.contains(&sequence_number)
    }

    pub fn fragment(&self, sequence_number: u32) -> Option<&Bytes> {
        self.fragments.get(&sequence_number)
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    pub fn on_datagram(&mut self, datagram: &Datagram) -> SessionOutput {
        let mut output = SessionOutput::default();

        match datagram.packet_kind() {
            Some(PacketKind::Syn) => self.on_syn(datagram, &mut output),
            Some(PacketKind::Data) => self.on_data(datagram, &mut output),
            Some(PacketKind::Ack) | Some(PacketKind::SynAck) => {
                trace!("ignoring {:?}", datagram);
            }
            Some(PacketKind::Nak) => {
                debug!("unexpected NAK from client {}: {:?} - ignoring", self.peer, datagram);
            }
            None => {
                debug!("unknown packet kind {} - dropping datagram", datagram.kind);
            }
        }

        output.completed_request = self.check_complete();
        output
    }

    fn on_syn(&mut self, syn: &Datagram, output: &mut SessionOutput) {
        let (total_fragments, syn_ack) = match accept_syn(syn, self.max_fragments) {
            Ok(x) => x,
            Err(e) => {
                warn!("corrupt SYN from {}: {}", self.peer, e);
                return;
            }
        };

        if let Some(previous) = self.handshake.total_fragments() {
            if previous != total_fragments {
                warn!("SYN from {} changes the fragment count from {} to {}", self.peer, previous, total_fragments);
            }
        }

        // DATA that arrived before the SYN already stands in for the client's ACK
        self.handshake = if self.acknowledged.is_empty() {
            ServerHandshakeState::SynReceived { total_fragments }
        }
        else {
            ServerHandshakeState::Established { total_fragments }
        };
        output.replies.push(syn_ack);
    }

    fn on_data(&mut self, datagram: &Datagram, output: &mut SessionOutput) {
        let sequence_number = datagram.sequence_number;
        let fragment_idx = match fragment_index(sequence_number) {
            Some(idx) => idx,
            None => {
                debug!("DATA with reserved sequence number {} - dropping", sequence_number);
                return;
            }
        };
        let upper_bound = self.total_fragments().unwrap_or(self.max_fragments);
        if fragment_idx >= upper_bound as usize {
            debug!("DATA #{} is beyond the announced {} fragments - dropping", sequence_number, upper_bound);
            return;
        }

        if let ServerHandshakeState::SynReceived { total_fragments } = self.handshake {
            self.handshake = ServerHandshakeState::Established { total_fragments };
        }

        if self.acknowledged.contains(fragment_idx) {
            trace!("duplicate DATA #{}", sequence_number);
            output.replies.push(self.ack(sequence_number));
            return;
        }

        if sequence_number == self.expected_sequence_number {
            self.store(sequence_number, datagram.payload.clone());
            output.replies.push(self.ack(sequence_number));
            self.expected_sequence_number += 1;
        }
        else if sequence_number < self.expected_sequence_number {
            output.replies.push(self.ack(sequence_number));
            if self.negatively_acknowledged.contains(&sequence_number) {
                trace!("DATA #{} resolves a NAK", sequence_number);
                self.store(sequence_number, datagram.payload.clone());
            }
        }
        else {
            self.store(sequence_number, datagram.payload.clone());
            output.replies.push(self.ack(sequence_number));
            for missing in self.expected_sequence_number..sequence_number {
                debug!("DATA #{} is missing - sending NAK", missing);
                self.negatively_acknowledged.insert(missing);
                output.replies.push(Datagram::control(PacketKind::Nak, missing, self.peer));
            }
            self.expected_sequence_number = sequence_number + 1;
        }
    }

    fn store(&mut self, sequence_number: u32, payload: Bytes) {
        if let Some(idx) = fragment_index(sequence_number) {
            self.acknowledged.insert(idx);
        }
        self.negatively_acknowledged.remove(&sequence_number);
        self.fragments.insert(sequence_number, payload);
    }

    fn ack(&self, sequence_number: u32) -> Datagram {
        Datagram::control(PacketKind::Ack, sequence_number, self.peer)
    }

    fn check_complete(&mut self) -> Option<Vec<u8>> {
        if self.dispatched {
            return None;
        }
        let total_fragments = self.total_fragments()?;

        let end = FIRST_DATA_SEQUENCE_NUMBER + total_fragments;
        let is_complete = if total_fragments == 1 {
            self.fragments.contains_key(&FIRST_DATA_SEQUENCE_NUMBER)
        }
        else {
            (FIRST_DATA_SEQUENCE_NUMBER..end).all(|seq| self.fragments.contains_key(&seq))
        };
        if !is_complete {
            return None;
        }

        self.dispatched = true;
        Some(reassemble(self.fragments.range(FIRST_DATA_SEQUENCE_NUMBER..end).map(|(_, f)| f.as_ref())))
    }

    /// NAKs for all fragments that are still missing: both outstanding NAKs and (if the number of
    ///  fragments is known) fragments after the highest one received so far
    pub fn refresh_naks(&self) -> Vec<Datagram> {
        if self.dispatched {
            return Vec::new();
        }

        let mut missing = self.negatively_acknowledged.iter().copied().collect::<Vec<_>>();
        if let Some(total_fragments) = self.total_fragments() {
            missing.extend(self.expected_sequence_number..FIRST_DATA_SEQUENCE_NUMBER + total_fragments);
        }
        missing.into_iter()
            .map(|seq| Datagram::control(PacketKind::Nak, seq, self.peer))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionOutcome {
    /// the response was written the configured number of times
    Delivered,
    /// writing the response failed
    PeerLost,
    /// no datagram arrived for the configured idle timeout
    IdleTimeout,
    /// the mailbox was closed before the request was complete
    Closed,
}

/// A session actor: it owns its [SessionState] exclusively, and receives datagrams through its
///  mailbox only.
pub struct Session {
    state: SessionState,
    config: Arc<RudpConfig>,
    send_pipeline: Arc<SendPipeline>,
    handler: Arc<dyn RequestHandler>,
    /// the source address of the most recent datagram, i.e. the relay's address
    reply_to: SocketAddr,
}

impl Session {
    pub fn new(
        peer: PeerKey,
        config: Arc<RudpConfig>,
        send_pipeline: Arc<SendPipeline>,
        handler: Arc<dyn RequestHandler>,
        reply_to: SocketAddr,
    ) -> Session {
        Session {
            state: SessionState::new(peer, config.max_fragments),
            config,
            send_pipeline,
            handler,
            reply_to,
        }
    }

    pub async fn run(mut self, mut mailbox: mpsc::Receiver<SessionMessage>) -> SessionOutcome {
        let request = match self.receive_request(&mut mailbox).await {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };

        let raw_response = handle_raw_request(self.handler.as_ref(), &request).await;
        let raw_response = if raw_response.len() > MAX_PAYLOAD_LEN {
            warn!("response of {} bytes exceeds a single datagram - truncating to {} bytes", raw_response.len(), MAX_PAYLOAD_LEN);
            Bytes::copy_from_slice(&raw_response[..MAX_PAYLOAD_LEN])
        }
        else {
            Bytes::from(raw_response)
        };
        let response = Datagram::new(PacketKind::Data, RESPONSE_SEQUENCE_NUMBER, self.state.peer, raw_response);

        self.deliver_response(&mut mailbox, &response).await
    }

    async fn receive_request(&mut self, mailbox: &mut mpsc::Receiver<SessionMessage>) -> Result<Vec<u8>, SessionOutcome> {
        let mut idle_deadline = Instant::now() + self.config.session_idle_timeout;
        let mut nak_deadline = Instant::now() + self.config.nak_resend_interval;

        loop {
            select! {
                msg = mailbox.recv() => {
                    let Some(msg) = msg else {
                        debug!("mailbox closed before the request was complete");
                        return Err(SessionOutcome::Closed);
                    };

                    let now = Instant::now();
                    idle_deadline = now + self.config.session_idle_timeout;
                    nak_deadline = now + self.config.nak_resend_interval;

                    self.reply_to = msg.from;
                    let output = self.state.on_datagram(&msg.datagram);
                    self.send_replies(output.replies).await;
                    if let Some(request) = output.completed_request {
                        debug!("request complete: {} bytes", request.len());
                        return Ok(request);
                    }
                }
                _ = sleep_until(nak_deadline) => {
                    let naks = self.state.refresh_naks();
                    if !naks.is_empty() {
                        debug!("session is quiet - re-sending {} NAKs", naks.len());
                    }
                    self.send_replies(naks).await;
                    nak_deadline = Instant::now() + self.config.nak_resend_interval;
                }
                _ = sleep_until(idle_deadline) => {
                    info!("session for {} idle for {:?} - discarding", self.state.peer, self.config.session_idle_timeout);
                    return Err(SessionOutcome::IdleTimeout);
                }
            }
        }
    }

    /// There is no acknowledgement for the response, so it is written a fixed number of times.
    ///  Datagrams arriving in the meantime are still answered (duplicates get re-ACK'ed), but they
    ///  never cause the handler to be called again.
    async fn deliver_response(&mut self, mailbox: &mut mpsc::Receiver<SessionMessage>, response: &Datagram) -> SessionOutcome {
        let mut num_attempts = 0;
        let mut next_attempt = Instant::now();

        loop {
            select! {
                _ = sleep_until(next_attempt) => {
                    if let Err(e) = self.send_pipeline.send_datagram(self.reply_to, response).await {
                        warn!("error sending response to {}: {} - discarding session", self.state.peer, e);
                        return SessionOutcome::PeerLost;
                    }
                    num_attempts += 1;
                    trace!("sent response ({} of {})", num_attempts, self.config.response_redelivery_attempts);
                    if num_attempts >= self.config.response_redelivery_attempts {
                        return SessionOutcome::Delivered;
                    }
                    next_attempt += self.config.response_redelivery_interval;
                }
                Some(msg) = mailbox.recv() => {
                    self.reply_to = msg.from;
                    let output = self.state.on_datagram(&msg.datagram);
                    self.send_replies(output.replies).await;
                }
            }
        }
    }

    /// ACKs and NAKs are best effort: the client re-sends fragments, and missing fragments are
    ///  re-NAK'ed. SYN-ACKs are retried a bounded number of times.
    async fn send_replies(&self, replies: Vec<Datagram>) {
        for reply in replies {
            let max_attempts = if reply.packet_kind() == Some(PacketKind::SynAck) {
                self.config.syn_ack_max_attempts
            }
            else {
                1
            };

            for attempt in 1..=max_attempts {
                match self.send_pipeline.send_datagram(self.reply_to, &reply).await {
                    Ok(()) => break,
                    Err(e) => warn!("error sending {:?} (attempt {} of {}): {}", reply, attempt, max_attempts, e),
                }
            }
        }
    }
}
