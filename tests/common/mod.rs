//! Shared utilities for integration testing.

use std::net::SocketAddr;

use direct_access_proxy::config::ProxyConfig;
use direct_access_proxy::http::HttpServer;
use direct_access_proxy::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Start an origin that answers every request with its own request head as
/// the body. A request for `/non-ascii` gets a response header with a
/// non-ASCII value.
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        }

                        let extra: &[u8] = if String::from_utf8_lossy(&head).contains("/non-ascii") {
                            b"X-Bin: caf\xe9\r\n"
                        } else {
                            b""
                        };

                        let mut response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Origin: echo\r\nConnection: close\r\n",
                            head.len()
                        )
                        .into_bytes();
                        response.extend_from_slice(extra);
                        response.extend_from_slice(b"\r\n");
                        response.extend_from_slice(&head);

                        let _ = socket.write_all(&response).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A running proxy under test.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config).expect("rules compile");
    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    TestProxy {
        addr,
        shutdown,
        config_updates,
    }
}

/// HTTP client sending everything through `proxy`.
pub fn proxy_client(proxy: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", proxy)).unwrap())
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Rule matching every path under `prefix` on `origin`.
pub fn rule_for(origin: SocketAddr, prefix: &str) -> String {
    format!("^{}{}", regex_escape(&origin.to_string()), prefix)
}

fn regex_escape(s: &str) -> String {
    s.replace('.', r"\.")
}
