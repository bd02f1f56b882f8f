//! HTTP handler abstractions
//!
//! Handlers write their response through a [`ResponseWriter`] instead of
//! returning a value. This lets decorators such as the metrics middleware
//! observe exactly what a handler wrote, including write failures, while the
//! response is streamed to the client.
//!
//! [`router`] serves any [`Handler`] from axum on a catch-all route.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use std::io;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod default;
pub mod writer;

pub use default::DefaultHandler;
pub use writer::{PendingResponse, StreamingWriter};

/// Number of body chunks buffered between a handler and the client
pub const RESPONSE_CHANNEL_CAPACITY: usize = 16;

/// Response-writing capability handed to a [`Handler`]
///
/// Semantics follow a classic streaming response writer:
/// - header changes made after the status line is written are ignored
/// - `write_header` sends the status line and headers
/// - `write` sends body bytes, writing a `200 OK` status line first if none
///   was written yet
#[async_trait]
pub trait ResponseWriter: Send {
    /// Response headers, sent with the status line
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write the status line and headers
    fn write_header(&mut self, status: StatusCode);

    /// Write body bytes, returning how many were accepted
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Request handler that writes its response through a [`ResponseWriter`]
///
/// `handle` is awaited to completion once per request.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request<Body>, writer: &mut dyn ResponseWriter);
}

/// Run `handler` for one request and stream what it writes back as a response
///
/// The handler runs on its own task so it always completes, even if the client
/// goes away and the response future is dropped. Writes after that point fail
/// with [`io::ErrorKind::BrokenPipe`].
pub async fn serve_handler<H: Handler + ?Sized>(handler: Arc<H>, request: Request) -> Response {
    let (mut writer, pending) = StreamingWriter::channel(RESPONSE_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        handler.handle(request, &mut writer).await;
        writer.finish();
    });

    pending.into_response().await
}

/// Build a router that serves `handler` for every path and method
pub fn router<H: Handler + ?Sized>(handler: Arc<H>) -> Router {
    Router::new()
        .fallback(move |request: Request| {
            let handler = Arc::clone(&handler);
            async move { serve_handler(handler, request).await }
        })
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header::CONTENT_TYPE};
    use tower::ServiceExt;

    struct StatusOnly(StatusCode);

    #[async_trait]
    impl Handler for StatusOnly {
        async fn handle(&self, _request: Request<Body>, writer: &mut dyn ResponseWriter) {
            writer.write_header(self.0);
        }
    }

    struct Chunked;

    #[async_trait]
    impl Handler for Chunked {
        async fn handle(&self, _request: Request<Body>, writer: &mut dyn ResponseWriter) {
            writer
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            writer.write(b"hello, ").await.unwrap();
            writer.write(b"world").await.unwrap();
        }
    }

    struct Silent;

    #[async_trait]
    impl Handler for Silent {
        async fn handle(&self, _request: Request<Body>, _writer: &mut dyn ResponseWriter) {}
    }

    async fn call(handler: Arc<dyn Handler>, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = router(handler)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_status_only_handler() {
        let (status, _, body) = call(Arc::new(StatusOnly(StatusCode::NO_CONTENT)), "/").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_chunks_are_streamed_in_order() {
        let (status, headers, body) = call(Arc::new(Chunked), "/any/path").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(body, b"hello, world");
    }

    #[tokio::test]
    async fn test_silent_handler_gets_implicit_ok() {
        let (status, _, body) = call(Arc::new(Silent), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }
}
