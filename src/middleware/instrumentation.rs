//! Outer HTTP server instrumentation
//!
//! [`ServerInstrumentation`] sits outside [`MetricsMiddleware`](super::MetricsMiddleware)
//! and measures what crosses the wire for each request:
//!
//! | Instrument                             | Kind      | Value                        |
//! |----------------------------------------|-----------|------------------------------|
//! | `http.server.request_content_length`   | counter   | request body bytes read      |
//! | `http.server.response_content_length`  | counter   | response body bytes written  |
//! | `http.server.duration`                 | histogram | handling time, milliseconds  |
//!
//! All three carry scheme, host, flavor and method labels. Handling runs
//! inside an `http_server` span tagged with the configured operation, so
//! per-message read and write events land on it.

use crate::handlers::{Handler, ResponseWriter};
use crate::labels::{LabelKey, http_basic_attributes};
use crate::middleware::tracker::{BodyTracker, MessageEvents, ResponseTracker};
use crate::sink::{Counter, Histogram, MetricSink};
use async_trait::async_trait;
use axum::{body::Body, extract::Request};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

pub const REQUEST_CONTENT_LENGTH: &str = "http.server.request_content_length";
pub const RESPONSE_CONTENT_LENGTH: &str = "http.server.response_content_length";
pub const SERVER_DURATION: &str = "http.server.duration";

/// Handler decorator recording body sizes and latency
pub struct ServerInstrumentation<H: ?Sized> {
    handler: Arc<H>,
    operation: String,
    events: MessageEvents,
    request_content_length: Option<Arc<dyn Counter>>,
    response_content_length: Option<Arc<dyn Counter>>,
    duration: Option<Arc<dyn Histogram>>,
}

impl<H: Handler + ?Sized> ServerInstrumentation<H> {
    /// Wrap `handler`, creating the size counters and the latency histogram in `sink`
    ///
    /// Instruments the sink refuses are logged and skipped, like the
    /// counters of the metrics middleware.
    pub fn new(handler: Arc<H>, sink: &dyn MetricSink, operation: impl Into<String>) -> Self {
        let counter = |name: &str| match sink.create_counter(name) {
            Ok(counter) => Some(counter),
            Err(e) => {
                tracing::error!(
                    counter = name,
                    error = %e,
                    "Failed to create counter, metric will not be reported"
                );
                None
            }
        };

        let duration = match sink.create_histogram(SERVER_DURATION) {
            Ok(histogram) => Some(histogram),
            Err(e) => {
                tracing::error!(
                    histogram = SERVER_DURATION,
                    error = %e,
                    "Failed to create histogram, metric will not be reported"
                );
                None
            }
        };

        Self {
            handler,
            operation: operation.into(),
            events: MessageEvents::NONE,
            request_content_length: counter(REQUEST_CONTENT_LENGTH),
            response_content_length: counter(RESPONSE_CONTENT_LENGTH),
            duration,
        }
    }

    /// Emit trace events for individual body reads and writes
    pub fn with_message_events(mut self, events: MessageEvents) -> Self {
        self.events = events;
        self
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for ServerInstrumentation<H> {
    async fn handle(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let start = Instant::now();
        let labels =
            http_basic_attributes(&request).with(LabelKey::Method, request.method().as_str());
        let span = tracing::debug_span!(
            "http_server",
            operation = %self.operation,
            method = %request.method(),
            uri = %request.uri()
        );

        let (request, body) = BodyTracker::wrap(request, self.events);
        let mut tracker = ResponseTracker::new(writer).with_events(self.events);

        self.handler
            .handle(request, &mut tracker)
            .instrument(span)
            .await;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let read_bytes = body.bytes_read();
        let wrote_bytes = tracker.bytes_written();

        if let Some(counter) = &self.request_content_length {
            counter.increment(read_bytes, &labels);
        }
        if let Some(counter) = &self.response_content_length {
            counter.increment(wrote_bytes, &labels);
        }
        if let Some(histogram) = &self.duration {
            histogram.record(elapsed_ms, &labels);
        }

        tracing::debug!(
            operation = %self.operation,
            read_bytes,
            wrote_bytes,
            body_complete = body.reached_end(),
            read_error = ?body.read_error(),
            duration_ms = elapsed_ms,
            "Request handled"
        );
    }
}
