//! Handler middleware
//!
//! - `instrumentation`: outer layer recording body sizes and latency
//! - `metrics`: request/response counters reported to a metric sink
//! - `tracker`: response writer and request body decorators used by both

pub mod instrumentation;
pub mod metrics;
pub mod tracker;

pub use instrumentation::ServerInstrumentation;
pub use metrics::{MetricsMiddleware, ServerCounter};
pub use tracker::{BodyState, BodyTracker, CapturedError, MessageEvents, ResponseTracker};
