use crate::http::handler::HandlerResponse;
use crate::http::{CRLF, PROTOCOL_VERSION};
use std::fmt::{Debug, Formatter};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum HttpParseError {
    #[error("empty message")]
    Empty,
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),
    #[error("malformed header: {0:?}")]
    MalformedHeader(String),
}

/// Canonical reason phrase for the status codes the servers produce
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Offset of the first byte after the blank line that terminates a message head
pub fn head_len(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// Total length of a request that is (at least partially) in the buffer, if its head is
///  complete. Requests without `Content-Length` have no body.
pub fn expected_request_len(buf: &[u8]) -> Option<usize> {
    let head_len = head_len(buf)?;
    let content_length = parse_headers(&String::from_utf8_lossy(&buf[..head_len]))
        .ok()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    Some(head_len + content_length)
}

fn split_head(raw: &[u8]) -> (String, &[u8]) {
    match head_len(raw) {
        Some(len) => (String::from_utf8_lossy(&raw[..len - HEAD_TERMINATOR.len()]).to_string(), &raw[len..]),
        None => (String::from_utf8_lossy(raw).trim_end().to_string(), &[]),
    }
}

/// Parses the header lines of a head, skipping its first (request or status) line
fn parse_headers(head: &str) -> Result<Vec<(String, String)>, HttpParseError> {
    let mut result = Vec::new();
    for line in head.lines().skip(1) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => {
                result.push((key.trim().to_string(), value.trim().to_string()));
            }
            _ => return Err(HttpParseError::MalformedHeader(line.to_string())),
        }
    }
    Ok(result)
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn write_headers(buf: &mut Vec<u8>, headers: &[(String, String)]) {
    for (key, value) in headers {
        buf.extend_from_slice(format!("{}:{}{}", key, value, CRLF).as_bytes());
    }
    buf.extend_from_slice(CRLF.as_bytes());
}

#[derive(Clone, Eq, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Debug for HttpRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} ({} headers, {} body bytes)", self.method, self.uri, self.version, self.headers.len(), self.body.len())
    }
}

impl HttpRequest {
    pub fn new(method: &str, uri: &str) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> HttpRequest {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Sets the body together with the matching `Content-Length` header
    pub fn with_body(mut self, body: Vec<u8>) -> HttpRequest {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Content-Length"));
        self.headers.push(("Content-Length".to_string(), body.len().to_string()));
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    /// The request URI's path without the leading `/` and without a query string, `None` for
    ///  the root
    pub fn path_param(&self) -> Option<&str> {
        let path = self.uri.split(['?', '#']).next().unwrap_or_default();
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            None
        }
        else {
            Some(path)
        }
    }

    pub fn format(&self) -> Vec<u8> {
        let mut buf = format!("{} {} {}{}", self.method, self.uri, self.version, CRLF).into_bytes();
        write_headers(&mut buf, &self.headers);
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Parses a complete request. If there is a `Content-Length` header, the body is cut off
    ///  after that many bytes.
    pub fn parse(raw: &[u8]) -> Result<HttpRequest, HttpParseError> {
        let (head, body) = split_head(raw);
        let request_line = head.lines().next()
            .ok_or(HttpParseError::Empty)?
            .trim_end_matches('\r');

        let mut parts = request_line.split_whitespace();
        let (method, uri, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(uri), Some(version), None) if version.starts_with("HTTP/") => (method, uri, version),
            _ => return Err(HttpParseError::MalformedRequestLine(request_line.to_string())),
        };

        let headers = parse_headers(&head)?;
        let body = match header(&headers, "Content-Length").and_then(|v| v.parse::<usize>().ok()) {
            Some(len) if len < body.len() => &body[..len],
            _ => body,
        };

        Ok(HttpRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers,
            body: body.to_vec(),
        })
    }
}

#[derive(Clone, Eq, PartialEq)]
pub struct HttpResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Debug for HttpResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} ({} headers, {} body bytes)", self.version, self.status, self.reason, self.headers.len(), self.body.len())
    }
}

impl HttpResponse {
    pub fn from_handler(response: HandlerResponse) -> HttpResponse {
        HttpResponse {
            version: PROTOCOL_VERSION.to_string(),
            status: response.status,
            reason: reason_phrase(response.status).to_string(),
            headers: response.headers,
            body: response.body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    pub fn is_redirect(&self) -> bool {
        (301..=303).contains(&self.status)
    }

    /// Status line and headers, without the terminating blank line
    pub fn head(&self) -> String {
        let mut result = format!("{} {} {}", self.version, self.status, self.reason);
        for (key, value) in &self.headers {
            result.push_str(CRLF);
            result.push_str(&format!("{}:{}", key, value));
        }
        result
    }

    pub fn format(&self) -> Vec<u8> {
        let mut buf = format!("{} {} {}{}", self.version, self.status, self.reason, CRLF).into_bytes();
        write_headers(&mut buf, &self.headers);
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Everything after the first blank line is the body
    pub fn parse(raw: &[u8]) -> Result<HttpResponse, HttpParseError> {
        let (head, body) = split_head(raw);
        let status_line = head.lines().next()
            .ok_or(HttpParseError::Empty)?
            .trim_end_matches('\r');

        let mut parts = status_line.splitn(3, ' ');
        let (version, status, reason) = match (parts.next(), parts.next(), parts.next()) {
            (Some(version), Some(status), reason) if version.starts_with("HTTP/") => {
                let status = status.parse::<u16>()
                    .map_err(|_| HttpParseError::MalformedStatusLine(status_line.to_string()))?;
                (version, status, reason.unwrap_or_default())
            }
            _ => return Err(HttpParseError::MalformedStatusLine(status_line.to_string())),
        };

        Ok(HttpResponse {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            headers: parse_headers(&head)?,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ok(200, "OK")]
    #[case::created(201, "Created")]
    #[case::no_content(204, "No Content")]
    #[case::moved(301, "Moved Permanently")]
    #[case::found(302, "Found")]
    #[case::not_modified(304, "Not Modified")]
    #[case::bad_request(400, "Bad Request")]
    #[case::unauthorized(401, "Unauthorized")]
    #[case::forbidden(403, "Forbidden")]
    #[case::not_found(404, "Not Found")]
    #[case::internal(500, "Internal Server Error")]
    #[case::not_implemented(501, "Not Implemented")]
    #[case::bad_gateway(502, "Bad Gateway")]
    #[case::unavailable(503, "Service Unavailable")]
    #[case::unknown(299, "Unknown")]
    fn test_reason_phrase(#[case] status: u16, #[case] expected: &str) {
        assert_eq!(reason_phrase(status), expected);
    }

    #[test]
    fn test_format_get_request() {
        let request = HttpRequest::new("GET", "/hello.txt?x=1")
            .with_header("Host", "localhost");
        assert_eq!(request.format(), b"GET /hello.txt?x=1 HTTP/1.0\r\nHost:localhost\r\n\r\n".to_vec());
    }

    #[test]
    fn test_format_post_request() {
        let request = HttpRequest::new("POST", "/out.txt")
            .with_header("Content-Length", "99")
            .with_body(b"abc".to_vec());
        assert_eq!(request.format(), b"POST /out.txt HTTP/1.0\r\nContent-Length:3\r\n\r\nabc".to_vec());
    }

    #[rstest]
    #[case::get(b"GET / HTTP/1.0\r\n\r\n", "GET", "/", vec![], b"")]
    #[case::headers(b"GET /a HTTP/1.0\r\nHost: x\r\nAccept:*/*\r\n\r\n", "GET", "/a", vec![("Host", "x"), ("Accept", "*/*")], b"")]
    #[case::post(b"POST /f HTTP/1.0\r\nContent-Length:5\r\n\r\nhello", "POST", "/f", vec![("Content-Length", "5")], b"hello")]
    #[case::trailing_crlf(b"POST /f HTTP/1.0\r\nContent-Length:2\r\n\r\nhi\r\n", "POST", "/f", vec![("Content-Length", "2")], b"hi")]
    #[case::no_blank_line(b"GET /x HTTP/1.1\r\n", "GET", "/x", vec![], b"")]
    fn test_parse_request(#[case] raw: &[u8], #[case] method: &str, #[case] uri: &str, #[case] headers: Vec<(&str, &str)>, #[case] body: &[u8]) {
        let request = HttpRequest::parse(raw).unwrap();
        assert_eq!(request.method, method);
        assert_eq!(request.uri, uri);
        assert_eq!(request.headers, headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<Vec<_>>());
        assert_eq!(request.body, body);
    }

    #[rstest]
    #[case::empty(b"", HttpParseError::Empty)]
    #[case::two_parts(b"GET /\r\n\r\n", HttpParseError::MalformedRequestLine("GET /".to_string()))]
    #[case::no_version(b"GET / x\r\n\r\n", HttpParseError::MalformedRequestLine("GET / x".to_string()))]
    #[case::header_without_colon(b"GET / HTTP/1.0\r\nbogus\r\n\r\n", HttpParseError::MalformedHeader("bogus".to_string()))]
    fn test_parse_request_malformed(#[case] raw: &[u8], #[case] expected: HttpParseError) {
        assert_eq!(HttpRequest::parse(raw), Err(expected));
    }

    #[rstest]
    #[case::root("/", None)]
    #[case::file("/a.txt", Some("a.txt"))]
    #[case::query("/a.txt?x=y", Some("a.txt"))]
    #[case::nested("/a/b", Some("a/b"))]
    #[case::parent("/../secret", Some("../secret"))]
    fn test_path_param(#[case] uri: &str, #[case] expected: Option<&str>) {
        assert_eq!(HttpRequest::new("GET", uri).path_param(), expected);
    }

    #[test]
    fn test_format_handler_response() {
        let response = HttpResponse::from_handler(HandlerResponse {
            body: b"nope".to_vec(),
            status: 404,
            headers: vec![("Content-Length".to_string(), "4".to_string())],
        });
        assert_eq!(response.format(), b"HTTP/1.0 404 Not Found\r\nContent-Length:4\r\n\r\nnope".to_vec());
        assert_eq!(response.head(), "HTTP/1.0 404 Not Found\r\nContent-Length:4");
    }

    #[test]
    fn test_parse_response() {
        let response = HttpResponse::parse(b"HTTP/1.0 301 Moved Permanently\r\nLocation: http://localhost/b\r\n\r\nbody\r\n\r\nmore").unwrap();
        assert_eq!(response.version, "HTTP/1.0");
        assert_eq!(response.status, 301);
        assert_eq!(response.reason, "Moved Permanently");
        assert_eq!(response.header("location"), Some("http://localhost/b"));
        assert_eq!(response.body, b"body\r\n\r\nmore");
        assert!(response.is_redirect());
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::not_http(b"FTP 200 OK\r\n\r\n")]
    #[case::status_not_numeric(b"HTTP/1.0 abc OK\r\n\r\n")]
    fn test_parse_response_malformed(#[case] raw: &[u8]) {
        assert!(HttpResponse::parse(raw).is_err());
    }

    #[rstest]
    #[case::incomplete_head(b"GET / HTTP/1.0\r\n", None)]
    #[case::no_body(b"GET / HTTP/1.0\r\n\r\n", Some(18))]
    #[case::body(b"POST / HTTP/1.0\r\nContent-Length:10\r\n\r\nabc", Some(48))]
    fn test_expected_request_len(#[case] buf: &[u8], #[case] expected: Option<usize>) {
        assert_eq!(expected_request_len(buf), expected);
    }
}
