//! Front doors over real sockets.
//!
//! Run with: cargo test --test servers
//!
//! Starts the gRPC service and the HTTP router on ephemeral ports, backed by
//! an on-disk SQLite store, and talks to them as external clients would.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Server};
use tonic::{Code, Request};

use eventsdb::config::{SqliteConfig, StorageConfig, StorageType, StreamLimits};
use eventsdb::engine::EventsEngine;
use eventsdb::handlers::{http, EventsDbService, TokenAuth};
use eventsdb::proto::events_db_client::EventsDbClient;
use eventsdb::proto::events_db_server::EventsDbServer;
use eventsdb::proto::{
    CreateEventRequest, GetEventByIdRequest, ListSubjectsRequest, StreamEventsFromSubjectRequest,
};
use eventsdb::storage::init_storage;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    grpc_addr: SocketAddr,
    http_addr: SocketAddr,
    engine: EventsEngine,
    stop: CancellationToken,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(token: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            storage_type: StorageType::Sqlite,
            sqlite: SqliteConfig {
                path: dir.path().join("events.db").to_string_lossy().into_owned(),
            },
            ..Default::default()
        };
        let store = init_storage(&storage).await.unwrap();
        let engine = EventsEngine::new(store, StreamLimits::default());
        let auth = TokenAuth::new(token);
        let stop = CancellationToken::new();

        let grpc_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let grpc_addr = grpc_listener.local_addr().unwrap();
        tokio::spawn(
            Server::builder()
                .add_service(EventsDbServer::with_interceptor(
                    EventsDbService::new(engine.clone()),
                    auth.clone(),
                ))
                .serve_with_incoming_shutdown(
                    TcpListenerStream::new(grpc_listener),
                    stop.clone().cancelled_owned(),
                ),
        );

        let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = http_listener.local_addr().unwrap();
        tokio::spawn(http::serve(
            http_listener,
            http::router(engine.clone(), auth),
            stop.clone().cancelled_owned(),
        ));

        Self {
            grpc_addr,
            http_addr,
            engine,
            stop,
            _dir: dir,
        }
    }

    async fn grpc_client(&self) -> EventsDbClient<Channel> {
        EventsDbClient::connect(format!("http://{}", self.grpc_addr))
            .await
            .expect("Failed to connect to gRPC server")
    }

    /// Open a raw HTTP/1.1 request and return the connection after the
    /// status line and headers, plus the status code.
    async fn http_get(&self, path_and_query: &str, headers: &[(&str, &str)]) -> (u16, TcpStream, String) {
        let mut stream = TcpStream::connect(self.http_addr).await.unwrap();
        let mut request = format!("GET {path_and_query} HTTP/1.1\r\nHost: localhost\r\n");
        for (name, value) in headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        let head = String::from_utf8(head).unwrap();
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap();
        (status, stream, head)
    }

    async fn shutdown(self) {
        self.engine.shutdown().await;
        self.stop.cancel();
    }
}

fn create_request(subject: &str, data: &[u8]) -> CreateEventRequest {
    CreateEventRequest {
        source: "integration".to_string(),
        r#type: "reading.taken".to_string(),
        subject: subject.to_string(),
        data: data.to_vec(),
    }
}

/// Read SSE `data:` lines from a chunked response until `count` arrive.
async fn read_sse_events(stream: &mut TcpStream, count: usize) -> Vec<serde_json::Value> {
    let mut pending = String::new();
    let mut events = Vec::new();
    let mut buf = [0u8; 4096];

    tokio::time::timeout(WAIT, async {
        while events.len() < count {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed the event stream");
            pending.push_str(&String::from_utf8_lossy(&buf[..n]));

            while let Some(end) = pending.find('\n') {
                let line: String = pending.drain(..=end).collect();
                if let Some(data) = line.trim_end().strip_prefix("data:") {
                    events.push(serde_json::from_str(data.trim_start()).unwrap());
                }
            }
        }
    })
    .await
    .expect("timed out waiting for SSE events");

    events
}

#[tokio::test]
async fn test_grpc_create_get_and_list() {
    let server = TestServer::start(None).await;
    let mut client = server.grpc_client().await;

    let id = client
        .create_event(create_request("sensor-1", b"21.5"))
        .await
        .unwrap()
        .into_inner()
        .id;

    let event = client
        .get_event_by_id(GetEventByIdRequest { id })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(event.subject, "sensor-1");
    assert_eq!(event.data, b"21.5");

    let missing = client
        .get_event_by_id(GetEventByIdRequest { id: id + 100 })
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::NotFound);

    let subjects = client
        .list_subjects(ListSubjectsRequest {})
        .await
        .unwrap()
        .into_inner()
        .subjects;
    assert_eq!(subjects, vec!["sensor-1"]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_grpc_stream_catchup_then_live() {
    let server = TestServer::start(None).await;
    let mut client = server.grpc_client().await;

    for _ in 0..3 {
        client.create_event(create_request("sensor-2", b"")).await.unwrap();
    }

    let mut stream = client
        .stream_events_from_subject(StreamEventsFromSubjectRequest {
            subject: "sensor-2".to_string(),
            after_id: 1,
        })
        .await
        .unwrap()
        .into_inner();

    let history = tokio::time::timeout(WAIT, stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let ids: Vec<i64> = history.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 3]);

    client.create_event(create_request("sensor-2", b"live")).await.unwrap();
    let live = tokio::time::timeout(WAIT, stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(live.events.len(), 1);
    assert_eq!(live.events[0].id, 4);
    assert_eq!(live.events[0].data, b"live");

    drop(stream);
    tokio::time::timeout(WAIT, async {
        while server.engine.active_listeners() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener not released after client hung up");

    server.shutdown().await;
}

#[tokio::test]
async fn test_grpc_token_enforced() {
    let server = TestServer::start(Some("s3cret")).await;
    let channel = Channel::from_shared(format!("http://{}", server.grpc_addr))
        .unwrap()
        .connect()
        .await
        .unwrap();

    let mut anonymous = EventsDbClient::new(channel.clone());
    let status = anonymous
        .list_subjects(ListSubjectsRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let token: MetadataValue<_> = "Bearer s3cret".parse().unwrap();
    let mut authed = EventsDbClient::with_interceptor(channel, move |mut req: Request<()>| {
        req.metadata_mut().insert("authorization", token.clone());
        Ok::<_, tonic::Status>(req)
    });
    assert!(authed.list_subjects(ListSubjectsRequest {}).await.is_ok());

    server.shutdown().await;
}

#[tokio::test]
async fn test_sse_receives_events_written_over_grpc() {
    let server = TestServer::start(None).await;
    let mut client = server.grpc_client().await;
    client.create_event(create_request("door-7", b"open")).await.unwrap();

    let (status, mut sse, head) = server.http_get("/events/stream?subject=door-7", &[]).await;
    assert_eq!(status, 200);
    assert!(head.to_ascii_lowercase().contains("text/event-stream"));

    let history = read_sse_events(&mut sse, 1).await;
    assert_eq!(history[0]["id"], 1);
    assert_eq!(history[0]["data"], "b3Blbg==");

    client.create_event(create_request("door-7", b"closed")).await.unwrap();
    let live = read_sse_events(&mut sse, 1).await;
    assert_eq!(live[0]["id"], 2);
    assert_eq!(live[0]["subject"], "door-7");

    server.shutdown().await;
}

#[tokio::test]
async fn test_http_health_exempt_from_token() {
    let server = TestServer::start(Some("s3cret")).await;

    let (health, _, _) = server.http_get("/health", &[]).await;
    assert_eq!(health, 200);

    let (anonymous, _, _) = server.http_get("/subjects", &[]).await;
    assert_eq!(anonymous, 401);

    let (authed, _, _) = server
        .http_get("/subjects", &[("Authorization", "Bearer s3cret")])
        .await;
    assert_eq!(authed, 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_open_streams() {
    let server = TestServer::start(None).await;
    let mut client = server.grpc_client().await;

    let mut stream = client
        .stream_events_from_subject(StreamEventsFromSubjectRequest {
            subject: "idle".to_string(),
            after_id: 0,
        })
        .await
        .unwrap()
        .into_inner();

    server.engine.shutdown().await;

    let end = tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("stream still open after shutdown");
    assert!(end.is_none());

    server.stop.cancel();
}
