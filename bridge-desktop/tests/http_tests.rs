//! Integration tests for the reqwest client against a minimal local server.
//!
//! This test suite verifies:
//! - Ranged and full GETs
//! - Redirect following, the hop limit and cross-protocol stops
//! - The per-chunk read timeout
//! - Error messages never carry the query string

use bridge_desktop::{HttpImageLoader, ReqwestHttpClient};
use bridge_traits::{
    BridgeError, ByteRange, HttpClient, HttpRequest, HttpSettings, ImageLoader,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const BODY: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

struct TestServer {
    base: String,
    requests: Arc<AtomicUsize>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Serves one response per connection, chosen by path:
/// - `/redirect/<n>` answers 302 to `/redirect/<n+1>`
/// - `/moved` answers 302 to `/clip.mp4`
/// - `/to-https` answers 302 to the same address over https
/// - `/stall` sends half the body and then goes silent
/// - anything else serves `BODY`, honoring a single `Range: bytes=a-b`
async fn spawn_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                serve(socket, addr.to_string(), counter).await;
            });
        }
    });

    TestServer {
        base: format!("http://{}", addr),
        requests,
    }
}

async fn serve(mut socket: TcpStream, authority: String, requests: Arc<AtomicUsize>) {
    let mut buf = vec![0u8; 4096];
    let mut read = 0;
    loop {
        let n = socket.read(&mut buf[read..]).await.unwrap();
        if n == 0 {
            return;
        }
        read += n;
        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    requests.fetch_add(1, Ordering::SeqCst);

    let request = String::from_utf8_lossy(&buf[..read]).to_lowercase();
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let path = path.split('?').next().unwrap_or("/").to_string();

    if let Some(n) = path.strip_prefix("/redirect/") {
        let next: usize = n.parse().unwrap();
        let location = format!("/redirect/{}", next + 1);
        socket.write_all(&redirect(&location)).await.unwrap();
    } else if path == "/moved" {
        socket.write_all(&redirect("/clip.mp4")).await.unwrap();
    } else if path == "/to-https" {
        let location = format!("https://{}/clip.mp4", authority);
        socket.write_all(&redirect(&location)).await.unwrap();
    } else if path == "/stall" {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            BODY.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&BODY[..BODY.len() / 2]).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        return;
    } else {
        let range = request
            .lines()
            .find_map(|l| l.strip_prefix("range: bytes="))
            .map(|r| r.trim().to_string());
        socket.write_all(&content(range)).await.unwrap();
    }
    socket.shutdown().await.ok();
}

fn redirect(location: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        location
    )
    .into_bytes()
}

fn content(range: Option<String>) -> Vec<u8> {
    match range {
        Some(r) => {
            let (a, b) = r.split_once('-').unwrap();
            let start: usize = a.parse().unwrap();
            let end: usize = if b.is_empty() {
                BODY.len() - 1
            } else {
                b.parse::<usize>().unwrap().min(BODY.len() - 1)
            };
            let slice = &BODY[start..=end];
            let mut head = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                slice.len(),
                start,
                end,
                BODY.len()
            )
            .into_bytes();
            head.extend_from_slice(slice);
            head
        }
        None => {
            let mut head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                BODY.len()
            )
            .into_bytes();
            head.extend_from_slice(BODY);
            head
        }
    }
}

fn client(settings: HttpSettings) -> ReqwestHttpClient {
    ReqwestHttpClient::new(settings).unwrap()
}

// ============================================================================
// Fetching
// ============================================================================

#[tokio::test]
async fn test_ranged_get_returns_partial_content() {
    let server = spawn_server().await;
    let client = client(HttpSettings::default());

    let response = client
        .open(HttpRequest::get(server.url("/clip.mp4")).range(ByteRange::new(10, Some(6))))
        .await
        .unwrap();

    assert!(response.is_partial_content());
    assert_eq!(response.content_range_total(), Some(BODY.len() as u64));
    let body = response.collect().await.unwrap();
    assert_eq!(&body[..], b"abcdef");
}

#[tokio::test]
async fn test_full_get_without_range() {
    let server = spawn_server().await;
    let client = client(HttpSettings::default());

    let body = client
        .fetch(HttpRequest::get(server.url("/clip.mp4")))
        .await
        .unwrap();
    assert_eq!(&body[..], BODY);
}

#[tokio::test]
async fn test_image_loader_fetches_bytes() {
    let server = spawn_server().await;
    let client: Arc<dyn HttpClient> = Arc::new(client(HttpSettings::default()));
    let loader = HttpImageLoader::new(client, "test-agent");

    let bytes = loader.load(&server.url("/cover.jpg")).await.unwrap();
    assert_eq!(bytes.len(), BODY.len());
}

// ============================================================================
// Redirects
// ============================================================================

#[tokio::test]
async fn test_same_scheme_redirect_is_followed() {
    let server = spawn_server().await;
    let client = client(HttpSettings {
        allow_cross_protocol_redirects: false,
        ..HttpSettings::default()
    });

    let body = client
        .fetch(HttpRequest::get(server.url("/moved")))
        .await
        .unwrap();
    assert_eq!(&body[..], BODY);
    assert_eq!(server.request_count(), 2);
}

#[tokio::test]
async fn test_redirect_hop_limit() {
    let server = spawn_server().await;
    let client = client(HttpSettings {
        max_redirects: 3,
        ..HttpSettings::default()
    });

    let result = client
        .open(HttpRequest::get(server.url("/redirect/0?sig=secret")))
        .await;

    let Err(err) = result else {
        panic!("redirect loop must fail");
    };
    assert!(matches!(err, BridgeError::OperationFailed(_)), "{err:?}");
    assert!(!err.to_string().contains("secret"));
    // The original request plus three followed hops.
    assert_eq!(server.request_count(), 4);
}

#[tokio::test]
async fn test_cross_protocol_redirect_stops_when_disabled() {
    let server = spawn_server().await;
    let client = client(HttpSettings {
        allow_cross_protocol_redirects: false,
        ..HttpSettings::default()
    });

    let response = client
        .open(HttpRequest::get(server.url("/to-https")))
        .await
        .unwrap();
    assert_eq!(response.status, 302);
    assert_eq!(server.request_count(), 1);

    let err = client
        .fetch(HttpRequest::get(server.url("/to-https?sig=secret")))
        .await
        .unwrap_err();
    match &err {
        BridgeError::Http { status, url } => {
            assert_eq!(*status, 302);
            assert_eq!(url, &server.url("/to-https"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Read Timeout
// ============================================================================

#[tokio::test]
async fn test_stalled_body_times_out() {
    let server = spawn_server().await;
    let client = client(HttpSettings {
        read_timeout: Duration::from_millis(200),
        ..HttpSettings::default()
    });

    let response = client
        .open(HttpRequest::get(server.url("/stall?sig=secret")))
        .await
        .unwrap();
    assert_eq!(response.status, 200);

    let err = tokio::time::timeout(Duration::from_secs(5), response.collect())
        .await
        .expect("read timeout must end the body")
        .unwrap_err();

    let BridgeError::Timeout(message) = &err else {
        panic!("expected a timeout, got {err:?}");
    };
    assert!(message.contains("/stall"));
    assert!(!message.contains("secret"));
}
