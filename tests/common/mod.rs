//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use secure_proxy_gateway::{Gateway, HttpServer, SystemConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Canned response served by a mock upstream.
#[derive(Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub extra_headers: Vec<(&'static str, &'static str)>,
    /// Served with `Content-Encoding: gzip` when the request accepts gzip.
    pub gzip_body: Option<&'static [u8]>,
}

impl MockResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.into(),
            extra_headers: Vec::new(),
            gzip_body: None,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.extra_headers.push((name, value));
        self
    }
}

/// A raw-TCP upstream that records the request head of every request it serves.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    pub async fn start(response: MockResponse) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let response = response.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let head = read_head(&mut socket).await;
                    seen.lock().unwrap().push(head.clone());

                    let wants_gzip = head.lines().any(|line| {
                        let line = line.to_ascii_lowercase();
                        line.starts_with("accept-encoding:") && line.contains("gzip")
                    });
                    let (body, encoding): (&[u8], Option<&str>) = match response.gzip_body {
                        Some(gzip) if wants_gzip => (gzip, Some("gzip")),
                        _ => (response.body.as_bytes(), None),
                    };

                    let mut head_out = format!(
                        "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                        response.status,
                        response.content_type,
                        body.len()
                    );
                    if let Some(encoding) = encoding {
                        head_out.push_str(&format!("Content-Encoding: {}\r\n", encoding));
                    }
                    for (name, value) in &response.extra_headers {
                        head_out.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    head_out.push_str("\r\n");
                    let mut raw = head_out.into_bytes();
                    raw.extend_from_slice(body);

                    let _ = socket.write_all(&raw).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request lines seen so far, e.g. `GET /v1/42 HTTP/1.1`.
    pub fn request_lines(&self) -> Vec<String> {
        self.request_heads()
            .iter()
            .filter_map(|head| head.lines().next().map(str::to_string))
            .collect()
    }

    /// Full request heads (request line and headers) seen so far.
    pub fn request_heads(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve `config` on an ephemeral port and return the gateway's base URL.
pub async fn spawn_gateway(config: SystemConfig) -> String {
    let gateway = Arc::new(Gateway::new(config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = HttpServer::new(gateway).run(listener, std::future::pending()).await;
    });

    format!("http://{}", addr)
}

/// A client that neither pools connections nor honours proxy env vars.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// A port with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// An upstream that streams chunked bytes until the gateway hangs up.
pub struct EndlessUpstream {
    pub addr: SocketAddr,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl EndlessUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = closed.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let flag = flag.clone();
                tokio::spawn(async move {
                    read_head(&mut socket).await;
                    let head = "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nTransfer-Encoding: chunked\r\n\r\n";
                    if socket.write_all(head.as_bytes()).await.is_err() {
                        return;
                    }
                    let chunk = format!("400\r\n{}\r\n", "z".repeat(0x400));
                    loop {
                        if socket.write_all(chunk.as_bytes()).await.is_err() {
                            flag.store(true, std::sync::atomic::Ordering::SeqCst);
                            return;
                        }
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    }
                });
            }
        });

        Self { addr, closed }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// True once a write to the gateway failed.
    pub fn saw_disconnect(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}
