//! This is a minimal reliability layer on top of UDP, purpose-built to carry exactly one HTTP
//!  request and one HTTP response per logical connection. Datagrams are routed through a relay
//!  (a fixed address and port) that translates addresses, so the peer identity is carried
//!  in-band in every datagram rather than being taken from the UDP source address.
//!
//! ## Design goals
//!
//! * Tolerate loss, duplication and reordering of datagrams
//! * Deliver the request to the application handler in-order and exactly once
//! * Serve many peers concurrently over a single shared UDP socket
//!   * one session task per peer, owning all of that peer's state (actor style)
//!   * the shared receive loop never blocks on a specific peer
//! * Every retry loop is bounded, and every write has a deadline
//!
//! ## Datagram
//!
//! All numbers in network byte order (BE):
//! ```ascii
//!  0: kind (u8): 0 DATA, 1 ACK, 2 SYN, 3 SYN_ACK, 4 NAK
//!  1: sequence number (u32)
//!  5: peer address (IPv4, 4 bytes)
//!  9: peer port (u16)
//! 11: payload (0..=1013 bytes)
//! ```
//!
//! A datagram on the wire is never longer than 1024 bytes.
//!
//! ## Conversation
//!
//! ```ascii
//!  client                                   server
//!    | --- SYN (seq 1, payload "<#frags>") --> |   session created, fragment count recorded
//!    | <-- SYN_ACK (seq 2) ------------------- |
//!    | --- ACK (seq 3) ----------------------> |   (informational, not required)
//!    | --- DATA (seq 4) ---------------------> |
//!    | <-- ACK (seq 4) ----------------------- |
//!    | --- DATA (seq 6) ---------------------> |   gap detected
//!    | <-- ACK (seq 6), NAK (seq 5) ---------- |
//!    | --- DATA (seq 5) ---------------------> |   retransmission, reassembly complete
//!    | <-- DATA (seq 1, HTTP response) ------- |   re-sent on a fixed cadence, bounded
//! ```
//!
//! Sequence numbers below 4 are reserved for the handshake, DATA fragments start at 4.
//!
//! *SYN*
//!
//! Sent by the client, the payload is the decimal number of DATA fragments that will follow.
//!  The server answers every SYN (including retransmitted ones) with a SYN_ACK carrying the
//!  SYN's sequence number plus one.
//!
//! *NAK*
//!
//! Sent by the server for every sequence number in a gap, i.e. when a DATA fragment arrives
//!  with a sequence number above the next expected one. The client re-sends exactly the
//!  fragment it built for that sequence number. A session that has gone quiet re-NAKs fragments
//!  that are still missing.
//!
//! *Response*
//!
//! A single DATA datagram with sequence number 1. There is no acknowledgement for it, so the
//!  server re-sends it a configured number of times before discarding the session.

pub mod client;
pub mod config;
pub mod end_point;
pub mod error;
pub mod fragmentation;
pub mod handshake;
pub mod packet;
pub mod peer_addr;
pub mod registry;
pub mod relay;
pub mod send_socket;
pub mod session;
