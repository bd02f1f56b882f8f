//! Metric sinks
//!
//! The middleware reports through the [`MetricSink`], [`Counter`] and
//! [`Histogram`] traits only. Concrete sinks are constructed by the caller and injected, so
//! there is no process-wide meter provider.
//!
//! - [`PrometheusSink`]: registry-backed sink used by the server and the push exporter
//! - [`MemorySink`]: in-process sink that keeps every observation for inspection

use crate::labels::LabelSet;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod prometheus;

pub use memory::{MemorySink, Observation, Recording};
pub use self::prometheus::PrometheusSink;

/// Monotonically increasing counter handle
///
/// Increments are fire-and-forget: implementations must be safe to call
/// concurrently and must not fail the caller. Internal failures are logged.
pub trait Counter: Send + Sync {
    fn increment(&self, amount: u64, labels: &LabelSet);
}

/// Distribution of recorded values, such as request latencies in milliseconds
///
/// Same contract as [`Counter`]: recording never fails the caller.
pub trait Histogram: Send + Sync {
    fn record(&self, value: f64, labels: &LabelSet);
}

/// Factory for named instruments
pub trait MetricSink: Send + Sync {
    /// Create (or look up) the counter registered under `name`
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the backend rejects the counter.
    fn create_counter(&self, name: &str) -> Result<Arc<dyn Counter>, SinkError>;

    /// Create (or look up) the histogram registered under `name`
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the backend rejects the histogram.
    fn create_histogram(&self, name: &str) -> Result<Arc<dyn Histogram>, SinkError>;
}

/// Errors raised while setting up instruments
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid metric name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Metric '{name}' rejected by metrics backend: {reason}")]
    Rejected { name: String, reason: String },

    #[error("Prometheus registry error: {0}")]
    Prometheus(#[from] ::prometheus::Error),
}
