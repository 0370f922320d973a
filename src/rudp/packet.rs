use crate::rudp::error::{RudpError, RudpResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Debug, Formatter};
use std::net::{Ipv4Addr, SocketAddrV4};

/// kind + sequence number + peer address + peer port
pub const HEADER_LEN: usize = 1 + 4 + 4 + 2;
pub const MAX_DATAGRAM_LEN: usize = 1024;
pub const MAX_PAYLOAD_LEN: usize = MAX_DATAGRAM_LEN - HEADER_LEN;

/// The initial sequence number a client uses for its SYN
pub const SYN_SEQUENCE_NUMBER: u32 = 1;
/// Sequence number of the server's response datagram
pub const RESPONSE_SEQUENCE_NUMBER: u32 = 1;
/// DATA fragments are numbered starting here, everything below is reserved for control use
pub const FIRST_DATA_SEQUENCE_NUMBER: u32 = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PacketKind {
    Data = 0,
    Ack = 1,
    Syn = 2,
    SynAck = 3,
    Nak = 4,
}

/// A single datagram as it goes over the wire.
///
/// The kind is kept as the raw byte that was received: decoding does not validate it, callers
///  match it against the known kinds via [Datagram::packet_kind].
#[derive(Clone, Eq, PartialEq)]
pub struct Datagram {
    pub kind: u8,
    pub sequence_number: u32,
    pub peer: SocketAddrV4,
    pub payload: Bytes,
}

impl Debug for Datagram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.packet_kind() {
            Some(PacketKind::Data) => "DATA".to_string(),
            Some(PacketKind::Ack) => "ACK".to_string(),
            Some(PacketKind::Syn) => "SYN".to_string(),
            Some(PacketKind::SynAck) => "SYN_ACK".to_string(),
            Some(PacketKind::Nak) => "NAK".to_string(),
            None => format!("?{}", self.kind),
        };
        write!(f, "{}#{}[{}]:{}", kind, self.sequence_number, self.peer, self.payload.len())
    }
}

impl Datagram {
    pub fn new(kind: PacketKind, sequence_number: u32, peer: SocketAddrV4, payload: impl Into<Bytes>) -> Datagram {
        let payload = payload.into();
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);

        Datagram {
            kind: kind.into(),
            sequence_number,
            peer,
            payload,
        }
    }

    pub fn control(kind: PacketKind, sequence_number: u32, peer: SocketAddrV4) -> Datagram {
        Self::new(kind, sequence_number, peer, Bytes::new())
    }

    pub fn packet_kind(&self) -> Option<PacketKind> {
        PacketKind::try_from(self.kind).ok()
    }

    pub fn serialized_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind);
        buf.put_u32(self.sequence_number);
        buf.put_u32(self.peer.ip().to_bits());
        buf.put_u16(self.peer.port());
        buf.put_slice(&self.payload);
    }

    pub fn deser(buf: &mut impl Buf) -> RudpResult<Datagram> {
        if buf.remaining() < HEADER_LEN {
            return Err(RudpError::MalformedDatagram { len: buf.remaining() });
        }

        let kind = buf.get_u8();
        let sequence_number = buf.get_u32();
        let ip = Ipv4Addr::from_bits(buf.get_u32());
        let port = buf.get_u16();
        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Datagram {
            kind,
            sequence_number,
            peer: SocketAddrV4::new(ip, port),
            payload,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn decode(mut raw: &[u8]) -> RudpResult<Datagram> {
        Self::deser(&mut raw)
    }
}
