use std::io;

/// Errors of the reliability layer. Most of them never reach the caller of the client or
///  server API: they are logged and recovered from locally (see the individual variants).
#[derive(Debug, thiserror::Error)]
pub enum RudpError {
    /// fewer than header length bytes - the datagram is dropped
    #[error("malformed datagram: {len} bytes is shorter than the datagram header")]
    MalformedDatagram { len: usize },

    /// the SYN payload is not a fragment count; the session's fragment count stays unset
    #[error("corrupt SYN payload: {0:?}")]
    CorruptHandshakePayload(String),

    #[error("handshake failed: no valid SYN-ACK after {attempts} attempts")]
    HandshakeFailed { attempts: usize },

    #[error("write timed out")]
    WriteTimeout,

    #[error("write failed: {0}")]
    WriteFailure(#[source] io::Error),

    #[error("payload of {len} bytes does not fit into a single datagram")]
    PayloadTooLarge { len: usize },

    #[error("invalid peer address: {0}")]
    InvalidPeerAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type RudpResult<T> = Result<T, RudpError>;
