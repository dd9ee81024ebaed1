//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, Semaphore};

pub type RequestLog = Arc<Mutex<Vec<String>>>;

/// Read one HTTP/1.1 request off the socket, returning the request head and
/// the body bytes announced by Content-Length.
pub async fn read_request(socket: &mut TcpStream) -> std::io::Result<(String, Vec<u8>)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_head_end(&data) {
            break pos;
        }
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = data[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    Ok((head, body))
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Start a mock backend that answers every request with a fixed response and
/// records the request heads it saw.
pub async fn spawn_recording_backend(status: u16, body: &'static str) -> (SocketAddr, RequestLog) {
    spawn_backend_with_headers(status, "", body).await
}

/// Like [`spawn_recording_backend`], with extra header lines (each
/// `\r\n`-terminated) injected into the response head.
pub async fn spawn_backend_with_headers(
    status: u16,
    extra_headers: &'static str,
    body: &'static str,
) -> (SocketAddr, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::default();

    tokio::spawn({
        let log = log.clone();
        async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let log = log.clone();
                tokio::spawn(async move {
                    if let Ok((head, _body)) = read_request(&mut socket).await {
                        log.lock().await.push(head);
                    }
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
                        status,
                        reason(status),
                        body.len(),
                        extra_headers,
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        }
    });

    (addr, log)
}

/// A backend that reads each request, then parks until released before
/// answering. Used to hold requests in flight at a known point.
pub struct GatedBackend {
    pub addr: SocketAddr,
    /// Notified once per request as soon as its head has been read.
    pub entered: Arc<Notify>,
    /// One permit releases one parked response.
    pub release: Arc<Semaphore>,
}

pub async fn spawn_gated_backend(body: &'static str) -> GatedBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Semaphore::new(0));

    tokio::spawn({
        let entered = entered.clone();
        let release = release.clone();
        async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let entered = entered.clone();
                let release = release.clone();
                tokio::spawn(async move {
                    if read_request(&mut socket).await.is_err() {
                        return;
                    }
                    entered.notify_one();
                    let Ok(_permit) = release.acquire().await else {
                        return;
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        }
    });

    GatedBackend {
        addr,
        entered,
        release,
    }
}

/// A backend that accepts connections and drops them on the floor without
/// answering, counting how many it saw.
pub async fn spawn_reset_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    tokio::spawn({
        let connections = connections.clone();
        async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                connections.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        }
    });

    (addr, connections)
}

/// A backend that reads the whole request, body included, then drops the
/// connection without answering. The client has transmitted its body by the
/// time the failure surfaces.
pub async fn spawn_body_eating_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    tokio::spawn({
        let connections = connections.clone();
        async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let _ = read_request(&mut socket).await;
                    drop(socket);
                });
            }
        }
    });

    (addr, connections)
}

/// An address nothing listens on; connecting to it is refused.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
