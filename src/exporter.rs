//! Periodic push exporter
//!
//! Gathers a Prometheus registry on a fixed interval and pushes it to a push
//! gateway (`PUT <push_url>/metrics/job/<job>`). The loop runs on its own
//! task and never blocks request handling. Failed pushes are logged and retried
//! on the next tick. Stopping the exporter performs one final push.

use crate::config::ExporterConfig;
use crate::error::{AppError, AppResult};
use crate::sink::prometheus::encode_text;
use prometheus::Registry;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Content type of the Prometheus text exposition format
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes a registry's metrics to a push gateway
pub struct PushExporter {
    client: reqwest::Client,
    url: String,
    interval: Duration,
    registry: Arc<Registry>,
}

impl PushExporter {
    /// Build an exporter for `registry` using the resolved gateway address
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ExporterConfig, registry: Arc<Registry>) -> AppResult<Self> {
        Self::with_base_url(&config.resolved_push_url(), config, registry)
    }

    /// Build an exporter pushing to `base_url` instead of the configured one
    pub fn with_base_url(
        base_url: &str,
        config: &ExporterConfig,
        registry: Arc<Registry>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!(
                "{}/metrics/job/{}",
                base_url.trim_end_matches('/'),
                config.job
            ),
            interval: config.interval(),
            registry,
        })
    }

    /// Full URL metrics are pushed to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push the current state of the registry once
    pub async fn push(&self) -> AppResult<()> {
        let body = encode_text(&self.registry)?;

        let response = self
            .client
            .put(&self.url)
            .header(CONTENT_TYPE, TEXT_FORMAT)
            .body(body)
            .send()
            .await
            .map_err(|source| AppError::PushFailed {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::PushRejected {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(url = %self.url, "Pushed metrics");
        Ok(())
    }

    /// Start pushing on the configured interval
    pub fn spawn(self) -> ExporterHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            tracing::info!(
                url = %self.url,
                interval_seconds = self.interval.as_secs(),
                "Push exporter started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.push().await {
                            tracing::warn!(error = %e, "Metrics push failed, retrying next interval");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }

            if let Err(e) = self.push().await {
                tracing::warn!(error = %e, "Final metrics push failed");
            }
            tracing::info!("Push exporter stopped");
        });

        ExporterHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Handle to a running [`PushExporter`]
pub struct ExporterHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ExporterHandle {
    /// Stop the push loop and wait for the final push
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Push exporter task terminated abnormally");
        }
    }
}
