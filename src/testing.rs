//! Canned HTTP server for transport tests.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// e.g. `POST /v1/chat/completions HTTP/1.1`
    pub request_line: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Serve canned HTTP responses, one per connection, recording each request.
/// Returns the base URL (`http://127.0.0.1:<port>`).
pub async fn serve(responses: Vec<String>) -> (String, Arc<Mutex<Vec<CapturedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);

    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let captured = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let head = &text[..end];
                    let header = |name: &str| {
                        head.lines().find_map(|l| {
                            let (key, value) = l.split_once(':')?;
                            key.eq_ignore_ascii_case(name)
                                .then(|| value.trim().to_string())
                        })
                    };
                    let length = header("content-length")
                        .map(|v| v.parse::<usize>().unwrap())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break CapturedRequest {
                            request_line: head.lines().next().unwrap_or_default().to_string(),
                            authorization: header("authorization"),
                            body: text[end + 4..end + 4 + length].to_string(),
                        };
                    }
                }
                if n == 0 {
                    break CapturedRequest {
                        request_line: String::new(),
                        authorization: None,
                        body: String::new(),
                    };
                }
            };
            recorded.lock().unwrap().push(captured);
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    (format!("http://{}", addr), requests)
}

pub fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}
