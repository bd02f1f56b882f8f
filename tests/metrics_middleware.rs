//! Integration tests for the metrics middleware served through the router
//!
//! Requests go through `handlers::router`, so the middleware sees the real
//! streaming response writer.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode, Version, header::HOST},
};
use otelmetrics_demo::{
    handlers::{self, DefaultHandler, Handler, ResponseWriter},
    labels::{LabelKey, LabelValue, TlsConnection},
    middleware::{
        MetricsMiddleware, ServerCounter, ServerInstrumentation,
        instrumentation::{REQUEST_CONTENT_LENGTH, RESPONSE_CONTENT_LENGTH, SERVER_DURATION},
        metrics::{REQUEST_COUNT, REQUEST_COUNT_BY_METHOD, RESPONSE_COUNT_BY_STATUS},
    },
    sink::{MemorySink, MetricSink, PrometheusSink},
};
use std::sync::{Arc, Mutex};
use tower::ServiceExt; // for `oneshot`

struct NotFound;

#[async_trait]
impl Handler for NotFound {
    async fn handle(&self, _request: Request<Body>, writer: &mut dyn ResponseWriter) {
        writer.write_header(StatusCode::NOT_FOUND);
        let _ = writer.write(b"not found").await;
    }
}

/// Records the request counter totals visible while handling
struct CounterSnapshot {
    sink: Arc<MemorySink>,
    seen: Mutex<Vec<(u64, u64, u64)>>,
}

#[async_trait]
impl Handler for CounterSnapshot {
    async fn handle(&self, _request: Request<Body>, writer: &mut dyn ResponseWriter) {
        self.seen.lock().unwrap().push((
            self.sink.total(REQUEST_COUNT),
            self.sink.total(REQUEST_COUNT_BY_METHOD),
            self.sink.total(RESPONSE_COUNT_BY_STATUS),
        ));
        let _ = writer.write(b"snapshot taken").await;
    }
}

/// Reads the whole request body and echoes it back
struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn handle(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        match axum::body::to_bytes(request.into_body(), usize::MAX).await {
            Ok(bytes) => {
                let _ = writer.write(&bytes).await;
            }
            Err(_) => writer.write_header(StatusCode::BAD_REQUEST),
        }
    }
}

/// Returns without writing anything
struct Silent;

#[async_trait]
impl Handler for Silent {
    async fn handle(&self, _request: Request<Body>, _writer: &mut dyn ResponseWriter) {}
}

async fn send<H: Handler + ?Sized>(handler: Arc<H>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = handlers::router(handler).oneshot(request).await.unwrap();
    let status = response.status();
    // Reading to the end waits for the handler task, including the response counter
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn memory_middleware<H: Handler>(
    handler: H,
    sink: &Arc<MemorySink>,
) -> Arc<MetricsMiddleware<H>> {
    Arc::new(MetricsMiddleware::new(
        Arc::new(handler),
        Arc::clone(sink) as Arc<dyn MetricSink>,
    ))
}

#[tokio::test]
async fn test_tls_get_404_labels() {
    let sink = Arc::new(MemorySink::new());
    let app = memory_middleware(NotFound, &sink);

    let mut request = Request::builder()
        .method(Method::GET)
        .uri("/widgets")
        .header(HOST, "api.example.com")
        .version(Version::HTTP_11)
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(TlsConnection);

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"not found");

    let responses = sink.observations(RESPONSE_COUNT_BY_STATUS);
    assert_eq!(responses.len(), 1);
    let labels = &responses[0].labels;
    assert_eq!(labels.get(LabelKey::Scheme), Some(&LabelValue::from("https")));
    assert_eq!(
        labels.get(LabelKey::Host),
        Some(&LabelValue::from("api.example.com"))
    );
    assert_eq!(labels.get(LabelKey::Flavor), Some(&LabelValue::from("1.1")));
    assert_eq!(labels.get(LabelKey::Method), Some(&LabelValue::from("GET")));
    assert_eq!(labels.get(LabelKey::StatusCode), Some(&LabelValue::Int(404)));
    assert!(!labels.contains(LabelKey::ErrorMessage));
}

#[tokio::test]
async fn test_default_handler_counts_200() {
    let sink = Arc::new(MemorySink::new());
    let app = memory_middleware(DefaultHandler, &sink);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(HOST, "localhost")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"default");

    let responses = sink.observations(RESPONSE_COUNT_BY_STATUS);
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].labels.get(LabelKey::Scheme),
        Some(&LabelValue::from("http"))
    );
    assert_eq!(
        responses[0].labels.get(LabelKey::Method),
        Some(&LabelValue::from("POST"))
    );
    assert_eq!(
        responses[0].labels.get(LabelKey::StatusCode),
        Some(&LabelValue::Int(200))
    );
}

#[tokio::test]
async fn test_request_counters_are_visible_to_handler() {
    let sink = Arc::new(MemorySink::new());
    let snapshot = Arc::new(CounterSnapshot {
        sink: Arc::clone(&sink),
        seen: Mutex::new(Vec::new()),
    });
    let app = Arc::new(MetricsMiddleware::new(
        Arc::clone(&snapshot),
        Arc::clone(&sink) as Arc<dyn MetricSink>,
    ));

    for _ in 0..3 {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        send(Arc::clone(&app), request).await;
    }

    let seen = snapshot.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(1, 1, 0), (2, 2, 1), (3, 3, 2)]);
    assert_eq!(sink.total(RESPONSE_COUNT_BY_STATUS), 3);
}

#[tokio::test]
async fn test_request_body_passes_through_tracker() {
    let sink = Arc::new(MemorySink::new());
    let app = memory_middleware(Echo, &sink);

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/echo")
        .body(Body::from("round trip"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"round trip");
    assert_eq!(sink.total(RESPONSE_COUNT_BY_STATUS), 1);
}

#[tokio::test]
async fn test_failed_response_counter_does_not_break_requests() {
    let sink = Arc::new(MemorySink::rejecting([RESPONSE_COUNT_BY_STATUS]));
    let app = memory_middleware(DefaultHandler, &sink);
    assert!(!app.is_reporting(ServerCounter::ResponseCountByStatus));

    for _ in 0..2 {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = send(Arc::clone(&app), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"default");
    }

    assert_eq!(sink.total(REQUEST_COUNT), 2);
    assert_eq!(sink.total(REQUEST_COUNT_BY_METHOD), 2);
    assert!(sink.observations(RESPONSE_COUNT_BY_STATUS).is_empty());
}

#[tokio::test]
async fn test_prometheus_sink_end_to_end() {
    let sink = PrometheusSink::with_env("test").unwrap();
    let app = Arc::new(MetricsMiddleware::new(
        Arc::new(NotFound),
        Arc::new(sink.clone()) as Arc<dyn MetricSink>,
    ));

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/gone")
        .header(HOST, "localhost:8080")
        .body(Body::empty())
        .unwrap();
    send(app, request).await;

    let output = sink.gather().expect("should gather");
    let response_line = output
        .lines()
        .find(|line| line.starts_with("http_server_response_count_by_status_code{"))
        .expect("response counter should be exported");
    assert!(response_line.contains("http_status=\"404\""));
    assert!(response_line.contains("http_method=\"DELETE\""));
    assert!(response_line.contains("http_host=\"localhost:8080\""));
    assert!(response_line.contains("env=\"test\""));
    assert!(response_line.ends_with(" 1"));

    assert!(output.contains("http_server_request_count{"));
    assert!(output.contains("http_server_request_count_by_method{"));
}

#[tokio::test]
async fn test_silent_handler_is_served_200_but_labelled_unset() {
    let sink = Arc::new(MemorySink::new());
    let app = memory_middleware(Silent, &sink);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;

    // The server still completes the exchange with an empty 200
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let responses = sink.observations(RESPONSE_COUNT_BY_STATUS);
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].labels.get(LabelKey::StatusCode),
        Some(&LabelValue::Int(0))
    );
}

#[tokio::test]
async fn test_instrumentation_wraps_metrics_middleware() {
    let sink = Arc::new(MemorySink::new());
    let metrics = memory_middleware(Echo, &sink);
    let app = Arc::new(ServerInstrumentation::new(metrics, &*sink, "server"));

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/echo")
        .header(HOST, "localhost:8080")
        .body(Body::from("twelve bytes"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"twelve bytes");

    assert_eq!(sink.total(REQUEST_CONTENT_LENGTH), 12);
    assert_eq!(sink.total(RESPONSE_CONTENT_LENGTH), 12);
    assert_eq!(sink.recordings(SERVER_DURATION).len(), 1);
    assert_eq!(sink.total(REQUEST_COUNT), 1);
    assert_eq!(sink.total(RESPONSE_COUNT_BY_STATUS), 1);

    let size = &sink.observations(RESPONSE_CONTENT_LENGTH)[0];
    assert_eq!(size.labels.get(LabelKey::Method), Some(&LabelValue::from("PUT")));
    assert!(!size.labels.contains(LabelKey::StatusCode));
}

#[tokio::test]
async fn test_prometheus_exports_sizes_and_duration() {
    let sink = PrometheusSink::new();
    let metrics = Arc::new(MetricsMiddleware::new(
        Arc::new(DefaultHandler),
        Arc::new(sink.clone()) as Arc<dyn MetricSink>,
    ));
    let app = Arc::new(ServerInstrumentation::new(metrics, &sink, "server"));

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    send(app, request).await;

    let output = sink.gather().expect("should gather");
    let response_size = output
        .lines()
        .find(|line| line.starts_with("http_server_response_content_length{"))
        .expect("response size should be exported");
    // "default"
    assert!(response_size.ends_with(" 7"), "got: {}", response_size);
    assert!(output.contains("# TYPE http_server_duration histogram"));
    assert!(output.contains("http_server_request_content_length{"));
}
