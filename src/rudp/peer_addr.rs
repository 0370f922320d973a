use crate::rudp::error::{RudpError, RudpResult};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

/// Identity of a peer as carried in-band in every datagram. Its `Display` form
///  `<ipv4-dotted>:<port>` is the session registry key.
pub type PeerKey = SocketAddrV4;

/// Parse a dotted-decimal IPv4 address and a port into a peer address. Malformed addresses are
///  rejected rather than being mapped to some byte values.
pub fn parse_peer_addr(host: &str, port: u16) -> RudpResult<SocketAddrV4> {
    let ip = Ipv4Addr::from_str(host)
        .map_err(|_| RudpError::InvalidPeerAddress(host.to_string()))?;
    Ok(SocketAddrV4::new(ip, port))
}

/// The relay and the datagram format only know about IPv4
pub fn to_peer_addr(addr: SocketAddr) -> RudpResult<SocketAddrV4> {
    match addr {
        SocketAddr::V4(addr) => Ok(addr),
        SocketAddr::V6(addr) => {
            match addr.ip().to_ipv4_mapped() {
                Some(ip) => Ok(SocketAddrV4::new(ip, addr.port())),
                None => Err(RudpError::InvalidPeerAddress(addr.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::localhost("127.0.0.1", 3000, "127.0.0.1:3000")]
    #[case::lan("192.168.2.10", 8080, "192.168.2.10:8080")]
    #[case::zero("0.0.0.0", 0, "0.0.0.0:0")]
    fn test_parse_peer_addr(#[case] host: &str, #[case] port: u16, #[case] expected_key: &str) {
        let key: PeerKey = parse_peer_addr(host, port).unwrap();
        assert_eq!(key.to_string(), expected_key);
    }

    #[rstest]
    #[case::hostname("localhost")]
    #[case::octet_overflow("1.2.3.256")]
    #[case::too_few_octets("1.2.3")]
    #[case::too_many_octets("1.2.3.4.5")]
    #[case::empty("")]
    #[case::garbage("a.b.c.d")]
    fn test_parse_peer_addr_malformed(#[case] host: &str) {
        assert!(matches!(parse_peer_addr(host, 80), Err(RudpError::InvalidPeerAddress(_))));
    }

    #[rstest]
    #[case::v4("1.2.3.4:5", Some("1.2.3.4:5"))]
    #[case::v4_mapped("[::ffff:1.2.3.4]:5", Some("1.2.3.4:5"))]
    #[case::v6("[1111:2222::3333:4444]:888", None)]
    fn test_to_peer_addr(#[case] addr: &str, #[case] expected: Option<&str>) {
        let addr = SocketAddr::from_str(addr).unwrap();
        assert_eq!(to_peer_addr(addr).ok().map(|a| a.to_string()), expected.map(|s| s.to_string()));
    }
}
