//! HTTP adapters for `feed-core`: a `reqwest` snapshot loader, an
//! event-stream transport, and a one-call mount against a real backend.

use std::time::Duration;

use bytes::Bytes;
use feed_core::{
    ByteStream, ConnectorConfig, Event, FeedConfig, FeedHandle, SnapshotError, SnapshotLoad,
    StreamTransport, TransportError, mount,
};
use futures::StreamExt;
use reqwest::{
    Client, RequestBuilder, Response,
    header::{ACCEPT, CACHE_CONTROL},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_FEED_PATH: &str = "/api/v1/activity/task-comments";
const STREAM_SUFFIX: &str = "/stream";
const LAST_EVENT_ID: &str = "Last-Event-ID";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedHttpError {
    #[error("http client could not be built: {0}")]
    Client(String),
    #[error("invalid feed url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// Where the feed lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFeedConfig {
    pub base_url: Url,
    pub feed_path: String,
    pub bearer_token: Option<String>,
    /// Timeout for the snapshot request. The stream has no overall timeout.
    pub request_timeout: Duration,
}

impl HttpFeedConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            feed_path: DEFAULT_FEED_PATH.to_owned(),
            bearer_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn snapshot_url(&self) -> Result<Url, FeedHttpError> {
        join_url(&self.base_url, &self.feed_path)
    }

    pub fn stream_url(&self) -> Result<Url, FeedHttpError> {
        let path = format!("{}{STREAM_SUFFIX}", self.feed_path.trim_end_matches('/'));
        join_url(&self.base_url, &path)
    }

    /// Shared client for the loader and the transport.
    pub fn build_client(&self) -> Result<Client, FeedHttpError> {
        Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| FeedHttpError::Client(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotBody {
    items: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// `GET <feed path>` returning `{ "items": [...] }`.
#[derive(Debug, Clone)]
pub struct HttpSnapshotLoader {
    client: Client,
    url: Url,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpSnapshotLoader {
    pub fn new(client: Client, config: &HttpFeedConfig) -> Result<Self, FeedHttpError> {
        Ok(Self {
            client,
            url: config.snapshot_url()?,
            bearer_token: config.bearer_token.clone(),
            timeout: config.request_timeout,
        })
    }
}

impl SnapshotLoad for HttpSnapshotLoader {
    async fn load(&self) -> Result<Vec<Event>, SnapshotError> {
        debug!(url = %self.url, "requesting feed snapshot");
        let request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "application/json")
            .timeout(self.timeout);
        let response = with_bearer(request, self.bearer_token.as_deref())
            .send()
            .await
            .map_err(map_snapshot_request_error)?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(map_snapshot_request_error)?;

        if !status.is_success() {
            return Err(SnapshotError::Server {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let body: SnapshotBody = serde_json::from_slice(&body)
            .map_err(|err| SnapshotError::Decode(err.to_string()))?;
        debug!(items = body.items.len(), "feed snapshot received");
        Ok(body.items)
    }
}

/// Opens `text/event-stream` connections with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpStreamTransport {
    client: Client,
    bearer_token: Option<String>,
}

impl HttpStreamTransport {
    pub fn new(client: Client, config: &HttpFeedConfig) -> Self {
        Self {
            client,
            bearer_token: config.bearer_token.clone(),
        }
    }
}

impl StreamTransport for HttpStreamTransport {
    async fn connect(
        &self,
        url: &Url,
        last_event_id: Option<&str>,
    ) -> Result<ByteStream, TransportError> {
        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID, id);
        }

        let response = with_bearer(request, self.bearer_token.as_deref())
            .send()
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        let response = check_stream_status(response)?;
        debug!(%url, "event stream response accepted");

        Ok(response
            .bytes_stream()
            .map(|chunk: Result<Bytes, reqwest::Error>| {
                chunk.map_err(|err| TransportError::Read(err.to_string()))
            })
            .boxed())
    }
}

/// Mount a feed backed by the HTTP endpoints in `config`.
pub fn mount_http_feed(
    config: &HttpFeedConfig,
    max_items: usize,
    connector: ConnectorConfig,
) -> Result<FeedHandle, FeedHttpError> {
    let client = config.build_client()?;
    let loader = HttpSnapshotLoader::new(client.clone(), config)?;
    let transport = HttpStreamTransport::new(client, config);

    let feed = FeedConfig {
        max_items,
        connector,
        ..FeedConfig::new(config.stream_url()?)
    };
    Ok(mount(loader, transport, feed))
}

fn with_bearer(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

fn check_stream_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Status(status.as_u16()))
    }
}

fn join_url(base: &Url, path: &str) -> Result<Url, FeedHttpError> {
    let raw = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|err| FeedHttpError::InvalidUrl {
        url: raw,
        message: err.to_string(),
    })
}

fn error_detail(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.detail)
        .filter(|detail| !detail.trim().is_empty())
}

fn map_snapshot_request_error(err: reqwest::Error) -> SnapshotError {
    if err.is_decode() {
        SnapshotError::Decode(err.to_string())
    } else {
        SnapshotError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use feed_core::{FeedStatus, SseDecoder, decode_event};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        time::timeout,
    };

    use super::*;

    enum Reply {
        Full {
            status: u16,
            content_type: &'static str,
            body: String,
        },
        Stream {
            chunks: Vec<String>,
            hold: Duration,
        },
    }

    impl Reply {
        fn json(status: u16, body: &str) -> Self {
            Self::Full {
                status,
                content_type: "application/json",
                body: body.to_owned(),
            }
        }
    }

    struct StubServer {
        base_url: Url,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn spawn<F>(route: F) -> Self
        where
            F: Fn(&str) -> Reply + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
            let addr = listener.local_addr().expect("stub addr");
            let requests = Arc::new(Mutex::new(Vec::new()));
            let route = Arc::new(route);

            let log = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let route = Arc::clone(&route);
                    let log = Arc::clone(&log);
                    tokio::spawn(async move {
                        let head = read_head(&socket).await;
                        let path = head
                            .lines()
                            .next()
                            .and_then(|line| line.split_whitespace().nth(1))
                            .unwrap_or("/")
                            .to_owned();
                        log.lock().expect("request log").push(head);
                        write_reply(socket, route(&path)).await;
                    });
                }
            });

            Self {
                base_url: Url::parse(&format!("http://{addr}")).expect("stub url"),
                requests,
            }
        }

        fn config(&self) -> HttpFeedConfig {
            HttpFeedConfig {
                request_timeout: Duration::from_secs(5),
                ..HttpFeedConfig::new(self.base_url.clone())
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().expect("request log").clone()
        }
    }

    async fn read_head(socket: &TcpStream) -> String {
        let mut head = Vec::new();
        let mut buf = [0_u8; 1024];
        loop {
            socket.readable().await.expect("stub readable");
            match socket.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    head.extend_from_slice(&buf[..n]);
                    if head.windows(4).any(|window| window == b"\r\n\r\n") {
                        break;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&head).to_ascii_lowercase()
    }

    async fn write_reply(mut socket: TcpStream, reply: Reply) {
        match reply {
            Reply::Full {
                status,
                content_type,
                body,
            } => {
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            Reply::Stream { chunks, hold } => {
                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in chunks {
                    if socket.write_all(chunk.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                }
                tokio::time::sleep(hold).await;
                let _ = socket.shutdown().await;
            }
        }
        // Drain anything the client still sends so the close is clean.
        let mut sink = [0_u8; 64];
        let _ = timeout(Duration::from_millis(50), socket.read(&mut sink)).await;
    }

    fn data_frame(id: &str) -> String {
        format!(
            "data: {{\"id\":\"{id}\",\"created_at\":\"2026-02-07T00:00:00Z\",\"message\":\"m {id}\"}}\n\n"
        )
    }

    #[test]
    fn builds_snapshot_and_stream_urls() {
        let config = HttpFeedConfig::new(Url::parse("http://localhost:8000/").expect("url"));
        assert_eq!(
            config.snapshot_url().expect("snapshot url").as_str(),
            "http://localhost:8000/api/v1/activity/task-comments"
        );
        assert_eq!(
            config.stream_url().expect("stream url").as_str(),
            "http://localhost:8000/api/v1/activity/task-comments/stream"
        );
    }

    #[test]
    fn keeps_base_path_prefix() {
        let config = HttpFeedConfig {
            feed_path: "feed/".to_owned(),
            ..HttpFeedConfig::new(Url::parse("https://mc.example.org/proxy").expect("url"))
        };
        assert_eq!(
            config.snapshot_url().expect("snapshot url").as_str(),
            "https://mc.example.org/proxy/feed/"
        );
        assert_eq!(
            config.stream_url().expect("stream url").as_str(),
            "https://mc.example.org/proxy/feed/stream"
        );
    }

    #[test]
    fn error_detail_requires_a_non_blank_string() {
        assert_eq!(error_detail(br#"{"detail":"boom"}"#), Some("boom".to_owned()));
        assert_eq!(error_detail(br#"{"detail":"  "}"#), None);
        assert_eq!(error_detail(br#"{"detail":[{"loc":"x"}]}"#), None);
        assert_eq!(error_detail(b"<html>bad gateway</html>"), None);
    }

    #[tokio::test]
    async fn loads_snapshot_items_in_server_order() {
        let stub = StubServer::spawn(|_| {
            Reply::json(
                200,
                r#"{"items":[{"id":"c2","created_at":"2026-02-07T00:00:02Z","message":"two"},{"id":"c1","created_at":"2026-02-07T00:00:01Z"}]}"#,
            )
        })
        .await;
        let config = HttpFeedConfig {
            bearer_token: Some("secret".to_owned()),
            ..stub.config()
        };
        let loader =
            HttpSnapshotLoader::new(config.build_client().expect("client"), &config).expect("loader");

        let items = loader.load().await.expect("snapshot");
        let ids: Vec<&str> = items.iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, ["c2", "c1"]);
        assert_eq!(items[0].message(), Some("two"));

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("get /api/v1/activity/task-comments http/1.1"));
        assert!(requests[0].contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn server_error_keeps_detail() {
        let stub = StubServer::spawn(|_| Reply::json(500, r#"{"detail":"boom"}"#)).await;
        let config = stub.config();
        let loader =
            HttpSnapshotLoader::new(config.build_client().expect("client"), &config).expect("loader");

        let err = loader.load().await.expect_err("500 must fail");
        assert_eq!(
            err,
            SnapshotError::Server {
                status: 500,
                detail: Some("boom".to_owned()),
            }
        );
        assert_eq!(err.user_message(), "boom");
    }

    #[tokio::test]
    async fn server_error_without_json_body_has_no_detail() {
        let stub = StubServer::spawn(|_| Reply::Full {
            status: 503,
            content_type: "text/html",
            body: "<html>unavailable</html>".to_owned(),
        })
        .await;
        let config = stub.config();
        let loader =
            HttpSnapshotLoader::new(config.build_client().expect("client"), &config).expect("loader");

        let err = loader.load().await.expect_err("503 must fail");
        assert_eq!(
            err,
            SnapshotError::Server {
                status: 503,
                detail: None,
            }
        );
    }

    #[tokio::test]
    async fn malformed_snapshot_is_a_decode_failure() {
        let stub = StubServer::spawn(|_| Reply::json(200, r#"{"results":[]}"#)).await;
        let config = stub.config();
        let loader =
            HttpSnapshotLoader::new(config.build_client().expect("client"), &config).expect("loader");

        let err = loader.load().await.expect_err("missing items must fail");
        assert!(matches!(err, SnapshotError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let config = HttpFeedConfig::new(Url::parse(&format!("http://{addr}")).expect("url"));
        let loader =
            HttpSnapshotLoader::new(config.build_client().expect("client"), &config).expect("loader");

        let err = loader.load().await.expect_err("closed port must fail");
        assert!(matches!(err, SnapshotError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn stream_transport_sends_resume_headers_and_yields_body() {
        let stub = StubServer::spawn(|_| Reply::Stream {
            chunks: vec![": keep-alive\n\n".to_owned(), data_frame("c7")],
            hold: Duration::ZERO,
        })
        .await;
        let config = stub.config();
        let transport = HttpStreamTransport::new(config.build_client().expect("client"), &config);

        let url = config.stream_url().expect("stream url");
        let mut body = transport
            .connect(&url, Some("41"))
            .await
            .expect("stream opens");

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.expect("chunk");
            for frame in decoder.push(&chunk) {
                let frame = frame.expect("line within limit");
                if let Some(event) = decode_event(&frame).expect("valid frame") {
                    events.push(event);
                }
            }
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "c7");

        let request = &stub.requests()[0];
        assert!(request.starts_with("get /api/v1/activity/task-comments/stream http/1.1"));
        assert!(request.contains("accept: text/event-stream"));
        assert!(request.contains("last-event-id: 41"));
    }

    #[tokio::test]
    async fn stream_transport_rejects_non_success_status() {
        let stub = StubServer::spawn(|_| Reply::json(404, r#"{"detail":"not found"}"#)).await;
        let config = stub.config();
        let transport = HttpStreamTransport::new(config.build_client().expect("client"), &config);

        let url = config.stream_url().expect("stream url");
        let err = match transport.connect(&url, None).await {
            Ok(_) => panic!("404 must not open a stream"),
            Err(err) => err,
        };
        assert_eq!(err, TransportError::Status(404));
    }

    #[tokio::test]
    async fn mounted_http_feed_merges_snapshot_and_stream() {
        let stub = StubServer::spawn(|path| {
            if path.ends_with("/stream") {
                Reply::Stream {
                    chunks: vec![data_frame("c1"), data_frame("c2")],
                    hold: Duration::from_secs(30),
                }
            } else {
                Reply::json(
                    200,
                    r#"{"items":[{"id":"c1","created_at":"2026-02-07T00:00:01Z"}]}"#,
                )
            }
        })
        .await;

        let handle = mount_http_feed(&stub.config(), 50, ConnectorConfig::default())
            .expect("feed mounts");
        let mut store = handle.store();

        let view = timeout(
            Duration::from_secs(10),
            store.wait_for(|view| view.events.len() == 2),
        )
        .await
        .expect("view timeout")
        .expect("store open");
        assert_eq!(view.status, FeedStatus::Ready);
        assert_eq!(view.event_ids(), ["c2", "c1"]);

        handle.unmount().await;
    }

    #[tokio::test]
    #[ignore = "runs against a live activity feed, requires ACTIVITY_FEED_API_URL"]
    async fn live_snapshot_smoke() {
        let base = env::var("ACTIVITY_FEED_API_URL").expect("ACTIVITY_FEED_API_URL must be set");
        let config = HttpFeedConfig {
            bearer_token: env::var("ACTIVITY_FEED_TOKEN").ok(),
            ..HttpFeedConfig::new(Url::parse(&base).expect("valid base url"))
        };

        let loader =
            HttpSnapshotLoader::new(config.build_client().expect("client"), &config).expect("loader");
        let items = loader.load().await.expect("live snapshot");
        for item in &items {
            assert!(!item.id.is_empty());
        }
    }
}
