//! Demo HTTP server with request/response metrics
//!
//! A [`middleware::MetricsMiddleware`] wraps the request handler and counts
//! requests and responses into an injected [`sink::MetricSink`]. The binary
//! backs the sink with a Prometheus registry that an [`exporter::PushExporter`]
//! pushes to a push gateway on a fixed interval.

pub mod cli;
pub mod config;
pub mod error;
pub mod exporter;
pub mod handlers;
pub mod labels;
pub mod middleware;
pub mod server;
pub mod sink;
pub mod telemetry;
