use crate::rudp::packet::{Datagram, PacketKind, FIRST_DATA_SEQUENCE_NUMBER, MAX_PAYLOAD_LEN};
use bytes::Bytes;
use std::net::SocketAddrV4;

/// Split a message into DATA datagrams of at most [MAX_PAYLOAD_LEN] payload bytes each,
///  numbered consecutively starting at [FIRST_DATA_SEQUENCE_NUMBER].
///
/// An empty message still yields a single (empty) fragment, so that there is always something
///  to announce in the handshake and to trigger reassembly on the receiving side.
pub fn fragment(message: &[u8], peer: SocketAddrV4) -> Vec<Datagram> {
    let message = Bytes::copy_from_slice(message);
    if message.is_empty() {
        return vec![Datagram::new(PacketKind::Data, FIRST_DATA_SEQUENCE_NUMBER, peer, message)];
    }

    let mut result = Vec::with_capacity(message.len().div_ceil(MAX_PAYLOAD_LEN));
    let mut offs = 0;
    let mut sequence_number = FIRST_DATA_SEQUENCE_NUMBER;
    while offs < message.len() {
        let end = usize::min(offs + MAX_PAYLOAD_LEN, message.len());
        result.push(Datagram::new(PacketKind::Data, sequence_number, peer, message.slice(offs..end)));
        offs = end;
        sequence_number += 1;
    }
    result
}

/// Index of a DATA sequence number in the list returned by [fragment], `None` for reserved
///  sequence numbers
pub fn fragment_index(sequence_number: u32) -> Option<usize> {
    sequence_number
        .checked_sub(FIRST_DATA_SEQUENCE_NUMBER)
        .map(|idx| idx as usize)
}

/// Concatenate fragment payloads in the order they are passed in
pub fn reassemble<'a>(fragments: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut result = Vec::new();
    for fragment in fragments {
        result.extend_from_slice(fragment);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::net::Ipv4Addr;

    fn peer() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080)
    }

    #[rstest]
    #[case::empty(0, 1)]
    #[case::one(1, 1)]
    #[case::exactly_one_fragment(1013, 1)]
    #[case::one_more(1014, 2)]
    #[case::several(5000, 5)]
    fn test_fragment_reassemble(#[case] len: usize, #[case] expected_num_fragments: usize) {
        let message = (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>();

        let fragments = fragment(&message, peer());
        assert_eq!(fragments.len(), expected_num_fragments);

        for (i, f) in fragments.iter().enumerate() {
            assert_eq!(f.packet_kind(), Some(PacketKind::Data));
            assert_eq!(f.sequence_number, FIRST_DATA_SEQUENCE_NUMBER + i as u32);
            assert_eq!(f.peer, peer());
            assert!(f.payload.len() <= MAX_PAYLOAD_LEN);
            assert_eq!(fragment_index(f.sequence_number), Some(i));
        }

        let reassembled = reassemble(fragments.iter().map(|f| f.payload.as_ref()));
        assert_eq!(reassembled, message);
    }

    #[rstest]
    #[case::syn(1, None)]
    #[case::reserved(3, None)]
    #[case::first(4, Some(0))]
    #[case::later(10, Some(6))]
    fn test_fragment_index(#[case] sequence_number: u32, #[case] expected: Option<usize>) {
        assert_eq!(fragment_index(sequence_number), expected);
    }
}
