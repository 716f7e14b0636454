//! End-to-end labeling through axum routers.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ws::WebSocketUpgrade, Path},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::{stream, StreamExt};
use hyper::body::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;
use tokio::net::{TcpListener, TcpStream};

use route_metrics::config::{LabelStrategy, RouteLabelConfig};
use route_metrics::http::instrument_router;
use route_metrics::MetricsLayer;

mod common;

use common::{send, Observation, RecordingSink};

fn app() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/api/users/{id}",
            get(|Path(id): Path<u32>| async move { format!("user {}", id) }),
        )
        .route(
            "/api/users",
            post(|| async { (StatusCode::CREATED, "created") }),
        )
}

fn routes(strategy: LabelStrategy, patterns: &[&str]) -> RouteLabelConfig {
    RouteLabelConfig {
        strategy,
        handler_id: String::new(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
}

#[tokio::test]
async fn named_route_groups_by_template() {
    let sink = RecordingSink::new();
    let router = instrument_router(app(), &routes(LabelStrategy::NamedRoute, &[]), sink.clone()).unwrap();

    assert_eq!(send(&router, "GET", "/api/users/42").await, (StatusCode::OK, "user 42".into()));
    send(&router, "GET", "/api/users/7").await;
    send(&router, "GET", "/health").await;

    assert_eq!(
        sink.labels(),
        vec!["/api/users/{id}", "/api/users/{id}", "/health"]
    );
}

#[tokio::test]
async fn named_route_observes_status_and_size() {
    let sink = RecordingSink::new();
    let router = instrument_router(app(), &routes(LabelStrategy::NamedRoute, &[]), sink.clone()).unwrap();

    let (status, body) = send(&router, "POST", "/api/users").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, "created");

    assert_eq!(
        sink.observations(),
        vec![Observation {
            handler_id: String::new(),
            method: "POST".into(),
            label: "/api/users".into(),
            status: 201,
            bytes: 7,
        }]
    );
}

#[tokio::test]
async fn direct_uses_literal_paths() {
    let sink = RecordingSink::new();
    let router = instrument_router(app(), &routes(LabelStrategy::Direct, &[]), sink.clone()).unwrap();

    send(&router, "GET", "/api/users/42").await;
    send(&router, "GET", "/api/users/7").await;

    assert_eq!(sink.labels(), vec!["/api/users/42", "/api/users/7"]);
}

#[tokio::test]
async fn fixed_handler_id_is_reported() {
    let sink = RecordingSink::new();
    let mut config = routes(LabelStrategy::Direct, &[]);
    config.handler_id = "users-api".into();
    let router = instrument_router(app(), &config, sink.clone()).unwrap();

    send(&router, "GET", "/api/users/42").await;
    assert_eq!(sink.observations()[0].handler_id, "users-api");
}

#[tokio::test]
async fn matching_uses_first_declared_pattern() {
    let sink = RecordingSink::new();
    let config = routes(LabelStrategy::Matching, &["/api/users/:id", "/api/*"]);
    let router = instrument_router(app(), &config, sink.clone()).unwrap();

    send(&router, "GET", "/api/users/42").await;
    send(&router, "POST", "/api/users").await;
    send(&router, "GET", "/health").await;

    assert_eq!(sink.labels(), vec!["/api/users/:id", "/api/*", "/health"]);
}

#[tokio::test]
async fn matching_rejects_malformed_patterns() {
    let sink = RecordingSink::new();
    let config = routes(LabelStrategy::Matching, &["/api/:"]);
    assert!(instrument_router(app(), &config, sink).is_err());
}

#[tokio::test]
async fn gateway_hook_captures_pattern() {
    let sink = RecordingSink::new();
    let router = instrument_router(app(), &routes(LabelStrategy::Gateway, &[]), sink.clone()).unwrap();

    send(&router, "GET", "/api/users/42").await;
    send(&router, "GET", "/health").await;

    assert_eq!(sink.labels(), vec!["/api/users/{id}", "/health"]);
}

#[tokio::test]
async fn gateway_without_hook_reports_empty_label() {
    let sink = RecordingSink::new();
    let router = app().layer(MetricsLayer::gateway(sink.clone()));

    send(&router, "GET", "/api/users/42").await;
    assert_eq!(sink.labels(), vec![String::new()]);
}

#[tokio::test]
async fn unmatched_requests_are_measured_with_fallback_status() {
    let sink = RecordingSink::new();
    let router = instrument_router(app(), &routes(LabelStrategy::NamedRoute, &[]), sink.clone()).unwrap();

    let (status, _) = send(&router, "GET", "/missing/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let seen = sink.observations();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].label, "/missing/1");
    assert_eq!(seen[0].status, 404);
}

#[tokio::test]
async fn websocket_upgrade_passes_through_the_interceptor() {
    let sink = RecordingSink::new();
    let router = Router::new()
        .route(
            "/ws",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|_socket| async {}).into_response()
            }),
        )
        .layer(MetricsLayer::named_route(sink.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"GET /ws HTTP/1.1\r\n\
              Host: localhost\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Version: 13\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(read > 0, "connection closed before response head");
        head.extend_from_slice(&buf[..read]);
    }

    let head = String::from_utf8_lossy(&head);
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {}", head);

    let seen = sink.wait_for(1).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status, 101);
    assert_eq!(seen[0].bytes, 0);
}

#[tokio::test]
async fn concurrent_requests_do_not_share_state() {
    let sink = RecordingSink::new();
    let router = instrument_router(app(), &routes(LabelStrategy::NamedRoute, &[]), sink.clone()).unwrap();

    let mut tasks = Vec::new();
    for id in 0..20u32 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            send(&router, "GET", &format!("/api/users/{}", id)).await
        }));
    }
    for task in tasks {
        let (status, _) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    let seen = sink.observations();
    assert_eq!(seen.len(), 20);
    for observation in seen {
        assert_eq!(observation.label, "/api/users/{id}");
        assert_eq!(observation.status, 200);
        assert!(observation.bytes >= "user 0".len() as u64);
    }
}

#[test]
fn sink_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Arc<RecordingSink>>();
    assert_send_sync::<MetricsLayer<route_metrics::reporter::Matching>>();
}

#[tokio::test]
async fn demo_host_labels_its_routes() {
    use route_metrics::config::MetricsConfig;
    use route_metrics::http::HttpServer;

    let sink = RecordingSink::new();
    let server = HttpServer::new(&MetricsConfig::default(), sink.clone()).unwrap();
    let router = server.router();

    assert_eq!(send(&router, "GET", "/users/9/posts/3").await.0, StatusCode::OK);
    assert_eq!(send(&router, "GET", "/static/css/site.css").await.0, StatusCode::OK);
    send(&router, "GET", "/health").await;

    assert_eq!(
        sink.labels(),
        vec!["/users/{id}/posts/{post}", "/static/{*path}", "/health"]
    );
}

/// Body yielding a fixed sequence of frames, like a gRPC response.
struct Frames(VecDeque<Frame<Bytes>>);

impl HttpBody for Frames {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Ready(self.0.pop_front().map(Ok))
    }
}

fn get_request(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn endless_stream_reaches_client_before_it_ends() {
    let sink = RecordingSink::new();
    let router = Router::new()
        .route(
            "/events/{topic}",
            get(|| async {
                let first = stream::once(async { Ok::<_, io::Error>(Bytes::from_static(b"data: hello\n\n")) });
                Body::from_stream(first.chain(stream::pending()))
            }),
        )
        .layer(MetricsLayer::named_route(sink.clone()));

    let response = tokio::time::timeout(Duration::from_secs(2), router.oneshot(get_request("/events/news")))
        .await
        .expect("instrumented route must send its head without waiting for the body")
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("first event must arrive while the stream is open")
        .unwrap()
        .unwrap();
    assert_eq!(&chunk[..], b"data: hello\n\n");
    assert!(sink.observations().is_empty());

    drop(body);
    let seen = sink.wait_for(1).await;
    assert_eq!(seen[0].label, "/events/{topic}");
    assert_eq!(seen[0].status, 200);
    assert_eq!(seen[0].bytes, 13);
}

#[tokio::test]
async fn trailers_survive_instrumentation() {
    let sink = RecordingSink::new();
    let router = Router::new()
        .route(
            "/pkg.Service/Call",
            post(|| async {
                let mut trailers = HeaderMap::new();
                trailers.insert("grpc-status", "0".parse().unwrap());
                let frames = Frames(VecDeque::from([
                    Frame::data(Bytes::from_static(b"msg")),
                    Frame::trailers(trailers),
                ]));
                Response::new(Body::new(frames))
            }),
        )
        .layer(MetricsLayer::gateway(sink.clone()));

    let req = Request::builder()
        .method("POST")
        .uri("/pkg.Service/Call")
        .body(Body::empty())
        .unwrap();
    let mut body = router.oneshot(req).await.unwrap().into_body();

    let mut data = Vec::new();
    let mut trailers = None;
    while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        let frame = frame.unwrap();
        match frame.into_data() {
            Ok(chunk) => data.extend_from_slice(&chunk),
            Err(frame) => trailers = frame.into_trailers().ok(),
        }
    }

    assert_eq!(data, b"msg");
    assert_eq!(trailers.expect("trailers forwarded")["grpc-status"], "0");
    assert_eq!(sink.observations()[0].bytes, 3);
}

#[tokio::test]
async fn body_error_reaches_client() {
    let sink = RecordingSink::new();
    let router = Router::new()
        .route(
            "/export",
            get(|| async {
                Body::from_stream(stream::iter([
                    Ok(Bytes::from_static(b"part")),
                    Err(io::Error::new(io::ErrorKind::Other, "boom")),
                ]))
            }),
        )
        .layer(MetricsLayer::named_route(sink.clone()));

    let response = router.oneshot(get_request("/export")).await.unwrap();
    assert!(axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .is_err());

    let seen = sink.wait_for(1).await;
    assert_eq!(seen[0].bytes, 4);
}
