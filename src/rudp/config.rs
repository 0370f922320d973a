use std::net::SocketAddr;
use std::time::Duration;
use anyhow::bail;
use crate::rudp::packet::FIRST_DATA_SEQUENCE_NUMBER;

#[derive(Debug, Clone)]
pub struct RudpConfig {
    /// All client datagrams are sent to this address, regardless of the peer they are meant
    ///  for. The relay forwards them based on the in-band peer address.
    pub relay_addr: SocketAddr,

    /// How long the client waits for a SYN-ACK before re-sending the SYN
    pub handshake_timeout: Duration,
    /// Number of SYNs the client sends before giving up with `HandshakeFailed`
    pub handshake_max_attempts: usize,
    /// Number of times the server tries to write a SYN-ACK if writing fails
    pub syn_ack_max_attempts: usize,

    /// Deadline for every single socket write. A write that does not complete in time counts
    ///  as failed.
    pub write_timeout: Duration,

    /// How long the client waits for the response datagram after sending all fragments
    pub response_timeout: Duration,

    /// The response datagram is not acknowledged, so the server writes it this many times
    ///  before discarding the session
    pub response_redelivery_attempts: usize,
    pub response_redelivery_interval: Duration,

    /// Upper bound for the number of fragments of a single request. This bounds the per-session
    ///  state a peer can make the server allocate.
    pub max_fragments: u32,

    /// Capacity of each session's mailbox. Datagrams for a session with a full mailbox are
    ///  dropped.
    pub mailbox_capacity: usize,
    /// Sessions that receive no datagram for this long are discarded
    pub session_idle_timeout: Duration,
    /// A session that received nothing for this long re-sends NAKs for fragments that are
    ///  still missing
    pub nak_resend_interval: Duration,
}

impl Default for RudpConfig {
    fn default() -> Self {
        RudpConfig {
            relay_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            handshake_timeout: Duration::from_secs(15),
            handshake_max_attempts: 8,
            syn_ack_max_attempts: 5,
            write_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(30),
            response_redelivery_attempts: 15,
            response_redelivery_interval: Duration::from_secs(1),
            max_fragments: 4096,
            mailbox_capacity: 64,
            session_idle_timeout: Duration::from_secs(60),
            nak_resend_interval: Duration::from_millis(500),
        }
    }
}

impl RudpConfig {
    pub fn with_relay_addr(relay_addr: SocketAddr) -> RudpConfig {
        RudpConfig {
            relay_addr,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.handshake_max_attempts == 0 {
            bail!("handshake_max_attempts must be at least 1");
        }
        if self.syn_ack_max_attempts == 0 {
            bail!("syn_ack_max_attempts must be at least 1");
        }
        if self.response_redelivery_attempts == 0 {
            bail!("response_redelivery_attempts must be at least 1");
        }
        if self.max_fragments == 0 {
            bail!("max_fragments must be at least 1");
        }
        // the highest sequence number must fit into the header
        if self.max_fragments > u32::MAX - FIRST_DATA_SEQUENCE_NUMBER {
            bail!("max_fragments must be at most {}", u32::MAX - FIRST_DATA_SEQUENCE_NUMBER);
        }
        if self.mailbox_capacity == 0 {
            bail!("mailbox_capacity must be at least 1");
        }
        if self.write_timeout.is_zero() {
            bail!("write_timeout must not be zero");
        }
        if self.nak_resend_interval.is_zero() {
            bail!("nak_resend_interval must not be zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_valid() {
        let config = RudpConfig::default();
        config.validate().unwrap();
        assert_eq!(config.response_redelivery_attempts, 15);
        assert_eq!(config.handshake_timeout, Duration::from_secs(15));
        assert_eq!(config.relay_addr.to_string(), "127.0.0.1:3000");
    }

    #[rstest]
    #[case::handshake(RudpConfig { handshake_max_attempts: 0, ..Default::default() })]
    #[case::syn_ack(RudpConfig { syn_ack_max_attempts: 0, ..Default::default() })]
    #[case::redelivery(RudpConfig { response_redelivery_attempts: 0, ..Default::default() })]
    #[case::max_fragments(RudpConfig { max_fragments: 0, ..Default::default() })]
    #[case::max_fragments_overflow(RudpConfig { max_fragments: u32::MAX - 3, ..Default::default() })]
    #[case::mailbox(RudpConfig { mailbox_capacity: 0, ..Default::default() })]
    #[case::write_timeout(RudpConfig { write_timeout: Duration::ZERO, ..Default::default() })]
    #[case::nak_resend(RudpConfig { nak_resend_interval: Duration::ZERO, ..Default::default() })]
    fn test_validate_rejects(#[case] config: RudpConfig) {
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_largest_max_fragments_is_valid() {
        let config = RudpConfig { max_fragments: u32::MAX - FIRST_DATA_SEQUENCE_NUMBER, ..Default::default() };
        config.validate().unwrap();
    }
}
