use crate::http::handler::RequestHandler;
use crate::rudp::config::RudpConfig;
use crate::rudp::packet::{Datagram, MAX_DATAGRAM_LEN};
use crate::rudp::peer_addr::PeerKey;
use crate::rudp::registry::SessionRegistry;
use crate::rudp::send_socket::SendPipeline;
use crate::rudp::session::{Session, SessionMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, info_span, span, trace, warn, Instrument, Level};
use uuid::Uuid;

/// The server side of the protocol: it listens on a single UdpSocket and dispatches incoming
///  datagrams to per-peer session tasks, which reassemble requests, call the handler and deliver
///  the responses.
pub struct RudpServer {
    socket: Arc<UdpSocket>,
    send_pipeline: Arc<SendPipeline>,
    registry: Arc<SessionRegistry>,
    handler: Arc<dyn RequestHandler>,
    config: Arc<RudpConfig>,
    cancel_sender: broadcast::Sender<()>,
}

impl RudpServer {
    pub async fn bind(
        addr: SocketAddr,
        config: Arc<RudpConfig>,
        handler: Arc<dyn RequestHandler>,
    ) -> anyhow::Result<RudpServer> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("bound UDP socket to {:?}", socket.local_addr()?);

        let (cancel_sender, _) = broadcast::channel(1);

        Ok(RudpServer {
            send_pipeline: Arc::new(SendPipeline::new(Arc::new(socket.clone()), config.write_timeout)),
            socket,
            registry: Default::default(),
            handler,
            config,
            cancel_sender,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Terminates a running receive loop. Calling this while no receive loop is running has no
    ///  effect.
    pub fn stop(&self) {
        match self.cancel_sender.send(()) {
            Ok(_) => info!("stopping receive loop"),
            Err(_) => debug!("call to stop while no receive loop is running"),
        }
    }

    /// Runs until [RudpServer::stop] is called. All sessions are discarded when the loop
    ///  terminates.
    pub async fn recv_loop(&self) {
        let mut cancel_receiver = self.cancel_sender.subscribe();
        info!("starting receive loop");

        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, from)) => {
                            let correlation_id = Uuid::new_v4();
                            let span = span!(Level::TRACE, "datagram_received", ?correlation_id);
                            self.on_raw_datagram(&buf[..len], from).instrument(span).await;
                        }
                        Err(e) => error!("socket error: {}", e),
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        self.registry.clear().await;
        info!("receive loop terminated");
    }

    async fn on_raw_datagram(&self, raw: &[u8], from: SocketAddr) {
        let datagram = match Datagram::decode(raw) {
            Ok(d) => d,
            Err(e) => {
                debug!("{} from {:?} - dropping", e, from);
                return;
            }
        };
        trace!("received {:?} from {:?}", datagram, from);

        // the peer's identity is what the datagram says, not where it came from: everything
        //  arrives through the relay
        let key = datagram.peer;
        let msg = SessionMessage { datagram, from };

        match self.mailbox_for(key, from).await.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                warn!("mailbox for {} is full - dropping {:?}", key, msg.datagram);
            }
            Err(TrySendError::Closed(msg)) => {
                // the session terminated after the lookup
                debug!("session for {} terminated - starting a new one", key);
                if let Err(e) = self.mailbox_for(key, from).await.try_send(msg) {
                    warn!("could not pass datagram to the session for {}: {}", key, e);
                }
            }
        }
    }

    async fn mailbox_for(&self, key: PeerKey, from: SocketAddr) -> mpsc::Sender<SessionMessage> {
        self.registry.get_or_create(key, self.config.mailbox_capacity, |session_id, mailbox| {
            let session = Session::new(
                key,
                self.config.clone(),
                self.send_pipeline.clone(),
                self.handler.clone(),
                from,
            );
            let registry = self.registry.clone();

            tokio::spawn(async move {
                let outcome = session.run(mailbox).await;
                debug!("session terminated: {:?}", outcome);
                registry.remove(&key, session_id).await;
            }.instrument(info_span!("session", peer = %key, session_id))).abort_handle()
        }).await
    }
}
