use crate::http::client::{HttpClient, Transport};
use crate::http::file_server::FileServer;
use crate::rudp::config::RudpConfig;
use crate::rudp::end_point::RudpServer;
use crate::rudp::relay::Relay;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Builder;


fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn fast_config(relay_addr: SocketAddr) -> RudpConfig {
    RudpConfig {
        handshake_timeout: Duration::from_millis(100),
        response_timeout: Duration::from_secs(5),
        response_redelivery_interval: Duration::from_millis(20),
        nak_resend_interval: Duration::from_millis(50),
        ..RudpConfig::with_relay_addr(relay_addr)
    }
}

/// Runs a file server for `dir` behind a relay, and calls `f` with an HTTP client talking to it
///  through the relay and the server's base URL
fn with_file_server<F, Fut>(dir: &TempDir, drop_rate: f64, f: F)
where
    F: FnOnce(HttpClient, String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let rt = Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(async {
        let relay = Arc::new(Relay::bind(loopback(), drop_rate).await.unwrap());
        let config = Arc::new(fast_config(relay.local_addr().unwrap()));

        let server = Arc::new(RudpServer::bind(loopback(), config.clone(), Arc::new(FileServer::new(dir.path()))).await.unwrap());
        let base_url = format!("http://{}", server.local_addr().unwrap());

        let relay_task = tokio::spawn({
            let relay = relay.clone();
            async move { relay.run().await }
        });
        let server_task = tokio::spawn({
            let server = server.clone();
            async move { server.recv_loop().await }
        });

        f(HttpClient::new(Transport::Datagram(config)), base_url).await;

        server.stop();
        relay.stop();
        server_task.await.unwrap();
        relay_task.await.unwrap();
    });
}

#[test]
fn test_list_files_through_relay() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    std::fs::write(dir.path().join("b.txt"), "b").unwrap();

    with_file_server(&dir, 0.0, |client, base_url| async move {
        let response = client.request("GET", &format!("{}/", base_url), &[], b"").await.unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"a.txt,b.txt");
        assert_eq!(response.header("Content-Disposition"), Some("inline"));
    });
}

#[test]
fn test_post_multi_fragment_body_then_get() {
    let dir = TempDir::new().unwrap();
    let body = (0..3000).map(|i| b'a' + (i % 26) as u8).collect::<Vec<_>>();

    with_file_server(&dir, 0.0, |client, base_url| {
        let body = body.clone();
        async move {
            let response = client.request("POST", &format!("{}/big.txt", base_url), &[], &body).await.unwrap().unwrap();
            assert_eq!(response.status, 200);

            let response = client.request("GET", &format!("{}/", base_url), &[], b"").await.unwrap().unwrap();
            assert_eq!(response.body, b"big.txt");
        }
    });

    assert_eq!(std::fs::read(dir.path().join("big.txt")).unwrap(), body);
}

#[test]
fn test_missing_file_through_relay() {
    let dir = TempDir::new().unwrap();

    with_file_server(&dir, 0.0, |client, base_url| async move {
        let response = client.request("GET", &format!("{}/missing.txt", base_url), &[], b"").await.unwrap().unwrap();
        assert_eq!(response.status, 404);
    });
}

#[test]
fn test_lossy_relay() {
    let dir = TempDir::new().unwrap();
    let body = (0..5000).map(|i| b'0' + (i % 10) as u8).collect::<Vec<_>>();

    with_file_server(&dir, 0.2, |client, base_url| {
        let body = body.clone();
        async move {
            let response = client.request("POST", &format!("{}/lossy.txt", base_url), &[], &body).await.unwrap().unwrap();
            assert_eq!(response.status, 200);
        }
    });

    assert_eq!(std::fs::read(dir.path().join("lossy.txt")).unwrap(), body);
}
