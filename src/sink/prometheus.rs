//! Prometheus registry-backed metric sink
//!
//! Every counter is an `IntCounterVec` and every histogram a `HistogramVec`
//! whose label names are the full [`LabelKey::ALL`] set. Labels absent from an observation are recorded with an
//! empty value, which Prometheus treats the same as a missing label. This keeps
//! one descriptor per metric name while label sets vary between observations.
//!
//! Metric names arrive in dotted form (`http.server.request_count`) and are
//! mapped to the Prometheus charset (`http_server_request_count`) here.

use super::{Counter, Histogram, MetricSink, SinkError};
use crate::labels::{LabelKey, LabelSet};
use ::prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Histogram bucket boundaries, in milliseconds
pub const LATENCY_BUCKETS_MS: [f64; 12] = [
    0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
];

/// Sink that registers counters and histograms in a Prometheus [`Registry`]
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    counters: Arc<Mutex<HashMap<String, Arc<PrometheusCounter>>>>,
    histograms: Arc<Mutex<HashMap<String, Arc<PrometheusHistogram>>>>,
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusSink {
    /// Create a sink backed by a fresh registry
    pub fn new() -> Self {
        Self::from_registry(Registry::new())
    }

    /// Create a sink whose registry attaches `env=<env>` to every metric
    ///
    /// # Errors
    ///
    /// Returns an error if the constant label is rejected by the registry.
    pub fn with_env(env: &str) -> Result<Self, SinkError> {
        let labels = HashMap::from([("env".to_string(), env.to_string())]);
        let registry = Registry::new_custom(None, Some(labels))?;
        Ok(Self::from_registry(registry))
    }

    fn from_registry(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            counters: Arc::new(Mutex::new(HashMap::new())),
            histograms: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Shared handle to the underlying registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, SinkError> {
        encode_text(&self.registry)
    }
}

/// Encode every metric family in `registry` as Prometheus text
pub fn encode_text(registry: &Registry) -> Result<String, SinkError> {
    let metric_families = registry.gather();
    let metric_count = metric_families.len();

    tracing::debug!(
        metric_family_count = metric_count,
        "Encoding metrics to Prometheus text format"
    );

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            e
        })?;

    String::from_utf8(buffer).map_err(|e| {
        ::prometheus::Error::Msg(format!(
            "Failed to convert metrics to UTF-8 at byte {}: {}",
            e.utf8_error().valid_up_to(),
            e
        ))
        .into()
    })
}

/// Map a dotted metric name to the Prometheus metric name charset
///
/// # Errors
///
/// Returns [`SinkError::InvalidName`] for empty names or characters that have
/// no Prometheus equivalent.
pub fn prometheus_metric_name(name: &str) -> Result<String, SinkError> {
    if name.is_empty() {
        return Err(SinkError::InvalidName {
            name: name.to_string(),
            reason: "metric name must not be empty".to_string(),
        });
    }

    let mapped: String = name
        .chars()
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .collect();

    if let Some(bad) = mapped
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == ':'))
    {
        return Err(SinkError::InvalidName {
            name: name.to_string(),
            reason: format!("character '{}' is not allowed", bad),
        });
    }

    if mapped.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(SinkError::InvalidName {
            name: name.to_string(),
            reason: "metric name must not start with a digit".to_string(),
        });
    }

    Ok(mapped)
}

fn label_names() -> Vec<&'static str> {
    LabelKey::ALL.iter().map(|key| key.prometheus_name()).collect()
}

/// Values for every [`LabelKey`] in declaration order, empty when absent
fn label_values(labels: &LabelSet) -> Vec<String> {
    LabelKey::ALL
        .iter()
        .map(|key| labels.get(*key).map(|v| v.to_string()).unwrap_or_default())
        .collect()
}

impl MetricSink for PrometheusSink {
    fn create_counter(&self, name: &str) -> Result<Arc<dyn Counter>, SinkError> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = counters.get(name) {
            return Ok(Arc::clone(existing) as Arc<dyn Counter>);
        }

        let metric_name = prometheus_metric_name(name)?;
        let vec = IntCounterVec::new(
            Opts::new(metric_name.clone(), format!("Counter for {}", name)),
            &label_names(),
        )?;
        self.registry.register(Box::new(vec.clone()))?;

        tracing::debug!(
            counter = %name,
            metric_name = %metric_name,
            "Registered Prometheus counter"
        );

        let counter = Arc::new(PrometheusCounter {
            name: name.to_string(),
            vec,
        });
        counters.insert(name.to_string(), Arc::clone(&counter));
        Ok(counter)
    }

    fn create_histogram(&self, name: &str) -> Result<Arc<dyn Histogram>, SinkError> {
        let mut histograms = self.histograms.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = histograms.get(name) {
            return Ok(Arc::clone(existing) as Arc<dyn Histogram>);
        }

        let metric_name = prometheus_metric_name(name)?;
        let vec = HistogramVec::new(
            HistogramOpts::new(metric_name.clone(), format!("Histogram for {}", name))
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &label_names(),
        )?;
        self.registry.register(Box::new(vec.clone()))?;

        tracing::debug!(
            histogram = %name,
            metric_name = %metric_name,
            "Registered Prometheus histogram"
        );

        let histogram = Arc::new(PrometheusHistogram {
            name: name.to_string(),
            vec,
        });
        histograms.insert(name.to_string(), Arc::clone(&histogram));
        Ok(histogram)
    }
}

struct PrometheusCounter {
    name: String,
    vec: IntCounterVec,
}

impl Counter for PrometheusCounter {
    fn increment(&self, amount: u64, labels: &LabelSet) {
        let values = label_values(labels);
        let values: Vec<&str> = values.iter().map(String::as_str).collect();

        match self.vec.get_metric_with_label_values(&values) {
            Ok(counter) => counter.inc_by(amount),
            Err(e) => {
                tracing::warn!(
                    counter = %self.name,
                    labels = %labels,
                    error = %e,
                    "Failed to record counter increment, dropping observation"
                );
            }
        }
    }
}

struct PrometheusHistogram {
    name: String,
    vec: HistogramVec,
}

impl Histogram for PrometheusHistogram {
    fn record(&self, value: f64, labels: &LabelSet) {
        // NaN or infinite values would poison every bucket and the sum
        if !value.is_finite() || value < 0.0 {
            tracing::warn!(
                histogram = %self.name,
                value,
                "Histogram value must be finite and non-negative, dropping observation"
            );
            return;
        }

        let values = label_values(labels);
        let values: Vec<&str> = values.iter().map(String::as_str).collect();

        match self.vec.get_metric_with_label_values(&values) {
            Ok(histogram) => histogram.observe(value),
            Err(e) => {
                tracing::warn!(
                    histogram = %self.name,
                    labels = %labels,
                    error = %e,
                    "Failed to record histogram value, dropping observation"
                );
            }
        }
    }
}
