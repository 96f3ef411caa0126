//! HTTP-level tests for `LlmAdapter` against a local canned server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use vibe_llm::{LlmAdapter, LlmConfig, LlmError, LlmProvider, TextGenerator};

/// One canned reply: raw byte parts written with a short pause in between.
/// `complete` false drops the connection without finishing the body.
struct Reply {
    parts: Vec<Vec<u8>>,
    complete: bool,
}

impl Reply {
    fn json(status: &str, body: &str) -> Self {
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        Self {
            parts: vec![[head.as_bytes(), body.as_bytes()].concat()],
            complete: true,
        }
    }

    fn chunked(chunks: Vec<Vec<u8>>, complete: bool) -> Self {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        let mut parts = vec![head.as_bytes().to_vec()];
        for chunk in chunks {
            let mut part = format!("{:x}\r\n", chunk.len()).into_bytes();
            part.extend_from_slice(&chunk);
            part.extend_from_slice(b"\r\n");
            parts.push(part);
        }
        if complete {
            parts.push(b"0\r\n\r\n".to_vec());
        }
        Self { parts, complete }
    }
}

async fn read_request(socket: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Serve `replies` in order, one per connection. Returns the base URL and a hit counter.
async fn serve(replies: Vec<Reply>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        for reply in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            read_request(&mut socket).await;
            for part in &reply.parts {
                if socket.write_all(part).await.is_err() {
                    break;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            if reply.complete {
                let _ = socket.shutdown().await;
            }
            drop(socket);
        }
    });

    (format!("http://{}", addr), hits)
}

fn ollama(url: &str) -> LlmAdapter {
    LlmAdapter::new(LlmConfig::default().base_url(url), None)
        .with_retry_delay(Duration::from_millis(5))
}

/// Server errors are retried and the next success is returned.
#[tokio::test]
async fn test_retries_server_error() {
    let (url, hits) = serve(vec![
        Reply::json("503 Service Unavailable", "busy"),
        Reply::json("200 OK", r#"{"message":{"role":"assistant","content":"ok"}}"#),
    ])
    .await;

    let text = ollama(&url).generate_text("hi", false).await.unwrap();

    assert_eq!(text, "ok");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

/// Client errors fail on the first attempt.
#[tokio::test]
async fn test_client_error_not_retried() {
    let (url, hits) = serve(vec![
        Reply::json("401 Unauthorized", r#"{"error":"bad key"}"#),
        Reply::json("200 OK", r#"{"choices":[{"message":{"content":"late"}}]}"#),
    ])
    .await;

    let adapter = LlmAdapter::new(
        LlmConfig::new(LlmProvider::OpenAI).base_url(&url),
        Some("key".to_string()),
    )
    .with_retry_delay(Duration::from_millis(5));
    let result = adapter.generate_text("hi", false).await;

    assert!(matches!(result, Err(LlmError::Api { status: 401, .. })));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// All attempts failing reports the last error.
#[tokio::test]
async fn test_retries_are_bounded() {
    let (url, hits) = serve(vec![
        Reply::json("500 Internal Server Error", "a"),
        Reply::json("502 Bad Gateway", "b"),
        Reply::json("429 Too Many Requests", "c"),
        Reply::json("200 OK", r#"{"message":{"content":"never"}}"#),
    ])
    .await;

    let result = ollama(&url).generate_text("hi", false).await;

    assert!(matches!(result, Err(LlmError::Api { status: 429, .. })));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

/// Streamed NDJSON is assembled in order, including characters split across chunks.
#[tokio::test]
async fn test_stream_assembles_split_characters() {
    let first = br#"{"message":{"content":"print('"}}"#.to_vec();
    let second = r#"{"message":{"content":"é')"}}"#.as_bytes().to_vec();
    // Cut inside the two-byte encoding of 'é'.
    let cut = second.iter().position(|&b| b == 0xC3).unwrap() + 1;

    let mut line_one = first;
    line_one.push(b'\n');
    let mut tail = second[cut..].to_vec();
    tail.extend_from_slice(b"\n{\"done\":true}\n");

    let (url, _) = serve(vec![Reply::chunked(
        vec![line_one, second[..cut].to_vec(), tail],
        true,
    )])
    .await;

    let seen = Arc::new(Mutex::new(String::new()));
    let sink = seen.clone();
    let adapter = ollama(&url).with_stream_sink(Arc::new(move |delta: &str| {
        sink.lock().push_str(delta);
    }));

    let text = adapter.generate_text("hi", true).await.unwrap();

    assert_eq!(text, "print('é')");
    assert_eq!(seen.lock().as_str(), "print('é')\n");
}

/// A stream that breaks after emitting text is not replayed.
#[tokio::test]
async fn test_interrupted_stream_not_retried() {
    let (url, hits) = serve(vec![
        Reply::chunked(vec![b"{\"message\":{\"content\":\"Hel\"}}\n".to_vec()], false),
        Reply::chunked(vec![b"{\"message\":{\"content\":\"Hello\"}}\n".to_vec()], true),
    ])
    .await;

    let seen = Arc::new(Mutex::new(String::new()));
    let sink = seen.clone();
    let adapter = ollama(&url).with_stream_sink(Arc::new(move |delta: &str| {
        sink.lock().push_str(delta);
    }));

    let result = adapter.generate_text("hi", true).await;

    assert!(matches!(result, Err(LlmError::StreamInterrupted(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().as_str(), "Hel\n");
}
