//! A small HTTP/1.0 layer on top of either a stream socket (TCP) or the reliable datagram
//!  transport in [crate::rudp].
//!
//! There is exactly one request and one response per connection. Requests and responses are
//!  plain text heads (`Key:Value` header lines separated by CRLF) followed by an optional body:
//!
//! ```ascii
//! GET /hello.txt HTTP/1.0
//! Host:localhost
//!
//! ```
//!
//! ```ascii
//! HTTP/1.0 200 OK
//! Content-Length:5
//! Content-Disposition:inline
//! Content-Type:text/plain
//!
//! hello
//! ```
//!
//! Servers are generic over a [handler::RequestHandler] that turns a parsed request into a
//!  status code, headers and a body. [file_server::FileServer] is the handler that serves a
//!  directory.

pub mod client;
pub mod file_server;
pub mod handler;
pub mod message;
pub mod stream;
pub mod url;

pub const CRLF: &str = "\r\n";
pub const PROTOCOL_VERSION: &str = "HTTP/1.0";
