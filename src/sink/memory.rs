//! In-process metric sink
//!
//! Keeps every observation in memory so callers can inspect exactly which
//! label sets were reported. Instrument names can be marked as rejected to
//! exercise degraded setup paths.

use super::{Counter, Histogram, MetricSink, SinkError};
use crate::labels::LabelSet;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One recorded increment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub amount: u64,
    pub labels: LabelSet,
}

/// One recorded histogram value
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub value: f64,
    pub labels: LabelSet,
}

#[derive(Default)]
pub struct MemorySink {
    counters: Mutex<HashMap<String, Arc<MemoryCounter>>>,
    histograms: Mutex<HashMap<String, Arc<MemoryHistogram>>>,
    rejected: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that refuses to create instruments with the given names
    pub fn rejecting<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rejected: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether a counter named `name` was successfully created
    pub fn has_counter(&self, name: &str) -> bool {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Every observation recorded on `name`, in order
    pub fn observations(&self, name: &str) -> Vec<Observation> {
        self.counter(name)
            .map(|counter| counter.snapshot())
            .unwrap_or_default()
    }

    /// Sum of all increments recorded on `name`
    pub fn total(&self, name: &str) -> u64 {
        self.observations(name).iter().map(|o| o.amount).sum()
    }

    /// Whether a histogram named `name` was successfully created
    pub fn has_histogram(&self, name: &str) -> bool {
        self.histograms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Every value recorded on histogram `name`, in order
    pub fn recordings(&self, name: &str) -> Vec<Recording> {
        let histogram = self
            .histograms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        histogram
            .map(|histogram| {
                histogram
                    .recordings
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone()
            })
            .unwrap_or_default()
    }

    fn counter(&self, name: &str) -> Option<Arc<MemoryCounter>> {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn check_accepted(&self, name: &str) -> Result<(), SinkError> {
        if self.rejected.contains(name) {
            return Err(SinkError::Rejected {
                name: name.to_string(),
                reason: "metric name is configured as rejected".to_string(),
            });
        }
        Ok(())
    }
}

impl MetricSink for MemorySink {
    fn create_counter(&self, name: &str) -> Result<Arc<dyn Counter>, SinkError> {
        self.check_accepted(name)?;

        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCounter::default()));
        Ok(Arc::clone(counter) as Arc<dyn Counter>)
    }

    fn create_histogram(&self, name: &str) -> Result<Arc<dyn Histogram>, SinkError> {
        self.check_accepted(name)?;

        let mut histograms = self.histograms.lock().unwrap_or_else(|e| e.into_inner());
        let histogram = histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryHistogram::default()));
        Ok(Arc::clone(histogram) as Arc<dyn Histogram>)
    }
}

#[derive(Default)]
struct MemoryCounter {
    observations: Mutex<Vec<Observation>>,
}

impl MemoryCounter {
    fn snapshot(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Counter for MemoryCounter {
    fn increment(&self, amount: u64, labels: &LabelSet) {
        self.observations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Observation {
                amount,
                labels: labels.clone(),
            });
    }
}

#[derive(Default)]
struct MemoryHistogram {
    recordings: Mutex<Vec<Recording>>,
}

impl Histogram for MemoryHistogram {
    fn record(&self, value: f64, labels: &LabelSet) {
        self.recordings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Recording {
                value,
                labels: labels.clone(),
            });
    }
}
