use crate::http::message::{HttpRequest, HttpResponse};
use crate::http::stream::stream_request;
use crate::http::url::Url;
use crate::rudp::client::ReliableSender;
use crate::rudp::config::RudpConfig;
use crate::rudp::peer_addr::parse_peer_addr;
use anyhow::{anyhow, bail};
use std::sync::Arc;
use tracing::{debug, info};

pub const MAX_REDIRECTS: usize = 5;

pub enum Transport {
    /// a TCP connection per request
    Stream,
    /// the reliable datagram protocol, through the relay configured in [RudpConfig]
    Datagram(Arc<RudpConfig>),
}

pub struct HttpClient {
    transport: Transport,
}

impl HttpClient {
    pub fn new(transport: Transport) -> HttpClient {
        HttpClient { transport }
    }

    /// Sends a request and follows redirects (with GET requests).
    ///
    /// Returns `Ok(None)` if the datagram transport got no response.
    pub async fn request(&self, method: &str, url: &str, headers: &[(String, String)], body: &[u8]) -> anyhow::Result<Option<HttpResponse>> {
        let mut url = Url::parse(url)?;
        let Some(mut response) = self.send(&url, &build_request(method, &url, headers, body)).await? else {
            return Ok(None);
        };

        let mut num_redirects = 0;
        while response.is_redirect() {
            if num_redirects == MAX_REDIRECTS {
                bail!("exceeded {} redirects", MAX_REDIRECTS);
            }
            let location = response.header("Location")
                .ok_or_else(|| anyhow!("redirect ({}) without Location header", response.status))?;
            url = url.join(location)?;
            info!("encountered status code {} - redirecting to {}", response.status, url);

            response = match self.send(&url, &build_request("GET", &url, headers, &[])).await? {
                Some(r) => r,
                None => return Ok(None),
            };
            num_redirects += 1;
        }
        Ok(Some(response))
    }

    async fn send(&self, url: &Url, request: &HttpRequest) -> anyhow::Result<Option<HttpResponse>> {
        debug!("sending {:?} to {}", request, url);
        let raw = match &self.transport {
            Transport::Stream => stream_request(&url.host_port(), &request.format()).await?,
            Transport::Datagram(config) => {
                let peer = parse_peer_addr(&url.host, url.port)?;
                match ReliableSender::new(config.clone()).send_request(peer, &request.format()).await? {
                    Some(raw) => raw.to_vec(),
                    None => return Ok(None),
                }
            }
        };
        Ok(Some(HttpResponse::parse(&raw)?))
    }
}

/// POST requests always carry a `Content-Length` header, other requests only if they have a body
fn build_request(method: &str, url: &Url, headers: &[(String, String)], body: &[u8]) -> HttpRequest {
    let mut request = HttpRequest::new(method, &url.request_uri);
    for (key, value) in headers {
        request = request.with_header(key, value);
    }
    if method.eq_ignore_ascii_case("POST") || !body.is_empty() {
        request = request.with_body(body.to_vec());
    }
    request
}
