//! Local stand-ins for service endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Reads one HTTP request, headers and body.
pub(crate) async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|value| value.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Writes a JSON response and closes the connection.
pub(crate) async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// A GraphQL endpoint answering the liveness and tip height queries.
///
/// Records which query each request carried, in arrival order.
#[derive(Clone)]
pub(crate) struct FakeIndexer {
    pub port: u16,
    height: Arc<AtomicU64>,
    queries: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeIndexer {
    pub(crate) async fn start(height: u64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let indexer = Self {
            port: listener.local_addr().unwrap().port(),
            height: Arc::new(AtomicU64::new(height)),
            queries: Arc::new(Mutex::new(Vec::new())),
        };

        let shared = indexer.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let shared = shared.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let body = if request.contains("__typename") {
                        shared.queries.lock().unwrap().push("typename");
                        r#"{"data":{"__typename":"Query"}}"#.to_string()
                    } else {
                        shared.queries.lock().unwrap().push("tip");
                        format!(
                            r#"{{"data":{{"state":{{"tip":{{"height":{}}}}}}}}}"#,
                            shared.height.load(Ordering::SeqCst)
                        )
                    };
                    respond(&mut socket, "200 OK", &body).await;
                });
            }
        });

        indexer
    }

    pub(crate) fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub(crate) fn queries(&self) -> Vec<&'static str> {
        self.queries.lock().unwrap().clone()
    }
}
