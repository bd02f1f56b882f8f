//! HTTP server metrics middleware
//!
//! Wraps a [`Handler`] and reports three counters per request:
//!
//! | Counter                                      | Labels                                     |
//! |----------------------------------------------|--------------------------------------------|
//! | `http.server.request_count`                  | scheme, host, flavor                       |
//! | `http.server.request_count_by_method`        | base + method                              |
//! | `http.server.response_count_by_status_code`  | base + method + status (+ error message)   |
//!
//! The first two are recorded before the inner handler runs, the last one
//! after it returns. Metrics failures never affect the response.

use crate::handlers::{Handler, ResponseWriter};
use crate::labels::{LabelKey, LabelSet, http_basic_attributes};
use crate::middleware::tracker::{BodyTracker, MessageEvents, ResponseTracker};
use crate::sink::{Counter, MetricSink};
use async_trait::async_trait;
use axum::{body::Body, extract::Request};
use std::collections::HashMap;
use std::sync::Arc;

pub const REQUEST_COUNT: &str = "http.server.request_count";
pub const REQUEST_COUNT_BY_METHOD: &str = "http.server.request_count_by_method";
pub const RESPONSE_COUNT_BY_STATUS: &str = "http.server.response_count_by_status_code";

/// Status label reported when the handler never wrote a status line
pub const UNSET_STATUS: u16 = 0;

/// Counters maintained by [`MetricsMiddleware`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerCounter {
    RequestCount,
    RequestCountByMethod,
    ResponseCountByStatus,
}

impl ServerCounter {
    pub const ALL: [ServerCounter; 3] = [
        ServerCounter::RequestCount,
        ServerCounter::RequestCountByMethod,
        ServerCounter::ResponseCountByStatus,
    ];

    /// Metric name reported to the sink
    pub fn name(&self) -> &'static str {
        match self {
            ServerCounter::RequestCount => REQUEST_COUNT,
            ServerCounter::RequestCountByMethod => REQUEST_COUNT_BY_METHOD,
            ServerCounter::ResponseCountByStatus => RESPONSE_COUNT_BY_STATUS,
        }
    }
}

/// Handler decorator that counts requests and responses
///
/// Counter handles are created once in [`MetricsMiddleware::new`]. The map is
/// never modified afterwards, so concurrent requests read it without locking.
pub struct MetricsMiddleware<H: ?Sized> {
    handler: Arc<H>,
    counters: HashMap<ServerCounter, Arc<dyn Counter>>,
}

impl<H: Handler + ?Sized> MetricsMiddleware<H> {
    /// Wrap `handler`, creating every [`ServerCounter`] in `sink`
    ///
    /// A counter the sink refuses to create is logged and left out: the
    /// middleware keeps serving requests and simply never reports that metric.
    pub fn new(handler: Arc<H>, sink: Arc<dyn MetricSink>) -> Self {
        let mut counters = HashMap::with_capacity(ServerCounter::ALL.len());

        for counter in ServerCounter::ALL {
            match sink.create_counter(counter.name()) {
                Ok(handle) => {
                    counters.insert(counter, handle);
                }
                Err(e) => {
                    tracing::error!(
                        counter = counter.name(),
                        error = %e,
                        "Failed to create counter, metric will not be reported"
                    );
                }
            }
        }

        tracing::debug!(
            created = counters.len(),
            expected = ServerCounter::ALL.len(),
            "Metrics middleware initialized"
        );

        Self { handler, counters }
    }

    /// Whether `counter` was created successfully and is being reported
    pub fn is_reporting(&self, counter: ServerCounter) -> bool {
        self.counters.contains_key(&counter)
    }

    fn add(&self, counter: ServerCounter, labels: &LabelSet) {
        if let Some(handle) = self.counters.get(&counter) {
            handle.increment(1, labels);
        }
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for MetricsMiddleware<H> {
    async fn handle(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        let labels = http_basic_attributes(&request);
        self.add(ServerCounter::RequestCount, &labels);

        let labels = labels.with(LabelKey::Method, request.method().as_str());
        self.add(ServerCounter::RequestCountByMethod, &labels);

        let (request, body) = BodyTracker::wrap(request, MessageEvents::NONE);
        let mut tracker = ResponseTracker::new(writer);

        self.handler.handle(request, &mut tracker).await;

        let status = tracker
            .status()
            .map_or(UNSET_STATUS, |status| status.as_u16());
        let mut labels = labels.with(LabelKey::StatusCode, status);
        if let Some(err) = tracker.last_error() {
            labels = labels.with(LabelKey::ErrorMessage, err.message());
        }

        if let Some(read_error) = body.read_error() {
            tracing::debug!(
                error = %read_error,
                labels = %labels,
                "Request body read failed"
            );
        }

        self.add(ServerCounter::ResponseCountByStatus, &labels);
    }
}
