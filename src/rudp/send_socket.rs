use crate::rudp::error::{RudpError, RudpResult};
use crate::rudp::packet::{Datagram, MAX_DATAGRAM_LEN};
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::trace;

/// This is an abstraction for sending a buffer on a UDP socket, introduced to facilitate mocking
///  the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) -> std::io::Result<()>;
}

#[async_trait]
impl SendSocket for Arc<UdpSocket> {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) -> std::io::Result<()> {
        trace!("UDP socket: sending {} bytes to {:?}", packet_buf.len(), to);
        self.send_to(packet_buf, to).await?;
        Ok(())
    }
}

/// Encodes datagrams and writes them to the socket, every write bounded by a deadline
#[derive(Clone)]
pub struct SendPipeline {
    socket: Arc<dyn SendSocket>,
    write_timeout: Duration,
}

impl SendPipeline {
    pub fn new(socket: Arc<dyn SendSocket>, write_timeout: Duration) -> SendPipeline {
        SendPipeline { socket, write_timeout, }
    }

    pub async fn send_datagram(&self, to: SocketAddr, datagram: &Datagram) -> RudpResult<()> {
        if datagram.serialized_len() > MAX_DATAGRAM_LEN {
            return Err(RudpError::PayloadTooLarge { len: datagram.payload.len() });
        }

        trace!("sending {:?} to {:?}", datagram, to);
        let buf = datagram.encode();
        self.send_raw(to, &buf).await
    }

    async fn send_raw(&self, to: SocketAddr, packet_buf: &[u8]) -> RudpResult<()> {
        match tokio::time::timeout(self.write_timeout, self.socket.do_send_packet(to, packet_buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RudpError::WriteFailure(e)),
            Err(_) => Err(RudpError::WriteTimeout),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::rudp::packet::{PacketKind, MAX_PAYLOAD_LEN};
    use bytes::Bytes;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tokio::runtime::Builder;

    fn peer() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 9)
    }

    /// A socket that never completes a write
    pub struct StallingSendSocket;

    #[async_trait]
    impl SendSocket for StallingSendSocket {
        async fn do_send_packet(&self, _to: SocketAddr, _packet_buf: &[u8]) -> std::io::Result<()> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_send_datagram() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let mut send_socket = MockSendSocket::new();
            send_socket.expect_do_send_packet()
                .once()
                .withf(|addr, buf|
                    addr == &SocketAddr::from(([5, 6, 7, 8], 3000)) &&
                        buf == [1, 0,0,0,4, 1,2,3,4, 0,9].as_slice()
                )
                .returning(|_, _| Ok(()));

            let pipeline = SendPipeline::new(Arc::new(send_socket), Duration::from_secs(1));
            pipeline.send_datagram(SocketAddr::from(([5, 6, 7, 8], 3000)), &Datagram::control(PacketKind::Ack, 4, peer()))
                .await
                .unwrap();
        });
    }

    #[test]
    fn test_send_datagram_io_failure() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let mut send_socket = MockSendSocket::new();
            send_socket.expect_do_send_packet()
                .once()
                .returning(|_, _| Err(std::io::Error::other("network unreachable")));

            let pipeline = SendPipeline::new(Arc::new(send_socket), Duration::from_secs(1));
            let result = pipeline.send_datagram(SocketAddr::from(([5, 6, 7, 8], 3000)), &Datagram::control(PacketKind::Ack, 4, peer())).await;
            assert!(matches!(result, Err(RudpError::WriteFailure(_))));
        });
    }

    #[test]
    fn test_send_datagram_timeout() {
        let rt = Builder::new_current_thread().enable_all().start_paused(true).build().unwrap();
        rt.block_on(async {
            let pipeline = SendPipeline::new(Arc::new(StallingSendSocket), Duration::from_secs(2));
            let result = pipeline.send_datagram(SocketAddr::from(([5, 6, 7, 8], 3000)), &Datagram::control(PacketKind::Nak, 5, peer())).await;
            assert!(matches!(result, Err(RudpError::WriteTimeout)));
        });
    }

    #[test]
    fn test_send_datagram_too_large() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let send_socket = MockSendSocket::new();
            let pipeline = SendPipeline::new(Arc::new(send_socket), Duration::from_secs(1));

            // bypassing the constructor's length check
            let datagram = Datagram {
                kind: PacketKind::Data.into(),
                sequence_number: 1,
                peer: peer(),
                payload: Bytes::from(vec![0u8; MAX_PAYLOAD_LEN + 1]),
            };
            let result = pipeline.send_datagram(SocketAddr::from(([5, 6, 7, 8], 3000)), &datagram).await;
            assert!(matches!(result, Err(RudpError::PayloadTooLarge { len }) if len == MAX_PAYLOAD_LEN + 1));
        });
    }
}
