use crate::http::message::{HttpParseError, HttpRequest, HttpResponse};
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tracing::debug;

/// What the application produces for a request: body, status code and headers. The server
///  turns this into a response with the matching status line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandlerResponse {
    pub body: Vec<u8>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl HandlerResponse {
    /// A response with `Content-Length` and `Content-Disposition` headers
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> HandlerResponse {
        let body = body.into();
        HandlerResponse {
            headers: vec![
                ("Content-Length".to_string(), body.len().to_string()),
                ("Content-Disposition".to_string(), "inline".to_string()),
            ],
            body,
            status,
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> HandlerResponse {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }
}

/// The application callback both servers invoke once per complete request
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: &HttpRequest) -> HandlerResponse;
}

/// Parse a raw request, pass it to the handler and format the response. Requests that can not
///  be parsed get a 400 response without bothering the handler.
pub async fn handle_raw_request(handler: &dyn RequestHandler, raw: &[u8]) -> Vec<u8> {
    let response = match HttpRequest::parse(raw) {
        Ok(request) => {
            debug!("handling request {:?}", request);
            handler.handle(&request).await
        }
        Err(e) => bad_request(&e),
    };
    HttpResponse::from_handler(response).format()
}

fn bad_request(e: &HttpParseError) -> HandlerResponse {
    debug!("malformed request: {}", e);
    HandlerResponse::new(400, format!("Malformed request: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Builder;

    #[test]
    fn test_handle_raw_request() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let mut handler = MockRequestHandler::new();
            handler.expect_handle()
                .once()
                .withf(|r| r.method == "GET" && r.uri == "/x")
                .returning(|_| HandlerResponse::new(200, "hi"));

            let response = handle_raw_request(&handler, b"GET /x HTTP/1.0\r\n\r\n").await;
            assert_eq!(response, b"HTTP/1.0 200 OK\r\nContent-Length:2\r\nContent-Disposition:inline\r\n\r\nhi".to_vec());
        });
    }

    #[test]
    fn test_handle_raw_request_malformed() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let mut handler = MockRequestHandler::new();
            handler.expect_handle()
                .never();

            let response = handle_raw_request(&handler, b"garbage\r\n\r\n").await;
            let response = HttpResponse::parse(&response).unwrap();
            assert_eq!(response.status, 400);
            assert_eq!(response.reason, "Bad Request");
        });
    }
}
