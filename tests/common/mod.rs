//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the mock backend saw.
#[derive(Debug, Clone, Default)]
#[allow(dead_code)]
pub struct Captured {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How the mock backend answers one connection.
#[allow(dead_code)]
pub enum Reply {
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: String,
    },
    /// Read the request, then close the socket without answering.
    Drop,
}

#[allow(dead_code)]
impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Reply::Respond {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Start a programmable mock backend on an ephemeral loopback port.
///
/// Each connection serves exactly one request.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(Captured) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(captured) = read_request(&mut socket).await else {
                            return;
                        };
                        match f(captured).await {
                            Reply::Respond { status, headers, body } => {
                                let mut response = format!(
                                    "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nConnection: close\r\n",
                                    status,
                                    body.len()
                                );
                                for (name, value) in headers {
                                    response.push_str(&format!("{name}: {value}\r\n"));
                                }
                                response.push_str("\r\n");
                                response.push_str(&body);
                                let _ = socket.write_all(response.as_bytes()).await;
                                let _ = socket.shutdown().await;
                                tokio::time::sleep(Duration::from_millis(10)).await;
                            }
                            Reply::Drop => {
                                drop(socket);
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that counts requests and answers each with `reply`.
#[allow(dead_code)]
pub async fn start_counting_backend<F>(reply: F) -> (SocketAddr, Arc<AtomicU32>)
where
    F: Fn(u32, Captured) -> Reply + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let reply = Arc::new(reply);
    let addr = start_programmable_backend(move |captured| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = reply.clone();
        async move { reply(n, captured) }
    })
    .await;
    (addr, calls)
}

/// Start a backend serving a fixed feed document with the given status.
#[allow(dead_code)]
pub async fn start_feed_server(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { Reply::status(status, body) }).await
}

async fn read_request(socket: &mut TcpStream) -> Option<Captured> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Captured {
        method,
        target,
        headers,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
