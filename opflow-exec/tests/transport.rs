use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opflow_exec::transport::ProgressSender;
use opflow_exec::{
    ProgressEvent, ReqwestTransport, ReqwestUploadTransport, RequestParts, Transport, TransportError,
    UploadTransport,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the local server saw for one request.
#[derive(Debug, Clone, Default)]
struct Seen {
    head: String,
    body: Vec<u8>,
}

/// Serves `response` (raw HTTP) to every connection and records requests.
async fn serve(response: String) -> (SocketAddr, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut stream).await;
            log.lock().unwrap().push(request);
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (addr, seen)
}

async fn read_request(stream: &mut TcpStream) -> Seen {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return Seen::default();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Seen { head, body }
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn request(method: &str, addr: SocketAddr, path: &str, body: &[u8]) -> RequestParts {
    RequestParts {
        method: method.to_string(),
        url: url::Url::parse(&format!("http://{addr}{path}")).unwrap(),
        headers: BTreeMap::from([("X-Trace".to_string(), "abc".to_string())]),
        body: body.to_vec(),
    }
}

#[tokio::test]
async fn sends_request_and_reads_response() {
    let (addr, seen) = serve(http_response("200 OK", r#"{"ok":true}"#)).await;
    let transport = ReqwestTransport::default();

    let resp = transport
        .send(request("POST", addr, "/jobs", b"payload"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, br#"{"ok":true}"#.to_vec());
    assert_eq!(resp.headers["content-type"], "application/json");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].head.starts_with("POST /jobs HTTP/1.1"));
    assert!(seen[0].head.to_ascii_lowercase().contains("x-trace: abc"));
    assert_eq!(seen[0].body, b"payload".to_vec());
}

#[tokio::test]
async fn non_success_status_is_returned_not_errored() {
    let (addr, _) = serve(http_response("503 Service Unavailable", "{}")).await;
    let resp = ReqwestTransport::default()
        .send(request("GET", addr, "/", b""), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(resp.status, 503);
}

#[tokio::test]
async fn slow_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let err = ReqwestTransport::default()
        .send(request("GET", addr, "/", b""), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Timeout);
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = ReqwestTransport::default()
        .send(request("GET", addr, "/", b""), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn oversized_response_is_rejected() {
    let big = "x".repeat(2048);
    let (addr, _) = serve(http_response("200 OK", &big)).await;

    let err = ReqwestTransport::default()
        .max_response_bytes(1024)
        .send(request("GET", addr, "/", b""), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::ResponseTooLarge { max_bytes: 1024 });
}

#[tokio::test]
async fn invalid_method_is_rejected_before_sending() {
    let (addr, seen) = serve(http_response("200 OK", "{}")).await;
    let err = ReqwestTransport::default()
        .send(request("BAD METHOD", addr, "/", b""), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Other(_)));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upload_streams_body_and_reports_progress() {
    let (addr, seen) = serve(http_response("201 Created", r#"{"id":1}"#)).await;
    let transport = ReqwestUploadTransport::default().chunk_size(256);
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

    let (tx, mut rx): (ProgressSender, _) = tokio::sync::mpsc::unbounded_channel();
    let resp = transport
        .upload(request("PUT", addr, "/files/a", &payload), Duration::from_secs(5), tx)
        .await
        .unwrap();
    assert_eq!(resp.status, 201);

    let mut events: Vec<ProgressEvent> = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    let loaded: Vec<u64> = events.iter().map(|e| e.loaded).collect();
    assert_eq!(loaded, vec![256, 512, 768, 1000]);
    assert!(events.iter().all(|e| e.total == Some(1000)));
    assert_eq!(events.last().and_then(ProgressEvent::percent), Some(100));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].body, payload);
    assert!(seen[0].head.to_ascii_lowercase().contains("content-length: 1000"));
}
