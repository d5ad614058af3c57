//! Append-only request metrics.
//!
//! Every proxied request produces exactly one [`ApiMetric`]; records are
//! never mutated or deleted by this layer (retention is an external
//! concern). Recording is best-effort: a failing recorder is logged by the
//! caller and never fails the request.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::feed::EndpointKind;
use crate::{ProviderId, UtcDateTime};

/// Outcome of one proxied request.
#[derive(Debug, Clone, Serialize)]
pub struct ApiMetric {
    pub endpoint: EndpointKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub cache_hit: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    pub timestamp: UtcDateTime,
}

impl ApiMetric {
    pub fn hit(endpoint: EndpointKind, latency_ms: u64) -> Self {
        Self {
            endpoint,
            status: Some(200),
            cache_hit: true,
            latency_ms,
            error: None,
            provider: None,
            timestamp: UtcDateTime::now(),
        }
    }

    pub fn miss(endpoint: EndpointKind, status: u16, latency_ms: u64) -> Self {
        Self {
            endpoint,
            status: Some(status),
            cache_hit: false,
            latency_ms,
            error: None,
            provider: None,
            timestamp: UtcDateTime::now(),
        }
    }

    pub fn error(endpoint: EndpointKind, latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            endpoint,
            status: None,
            cache_hit: false,
            latency_ms,
            error: Some(error.into()),
            provider: None,
            timestamp: UtcDateTime::now(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// Aggregate over a rolling window, served by the health endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSummary {
    pub window_secs: u64,
    pub total_requests: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub avg_latency_ms: u64,
}

/// Recorder-side failure; callers log and continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsError {
    message: String,
}

impl MetricsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MetricsError {}

type MetricsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, MetricsError>> + Send + 'a>>;

/// Append-only metrics sink.
pub trait MetricsRecorder: Send + Sync {
    fn record<'a>(&'a self, metric: ApiMetric) -> MetricsFuture<'a, ()>;

    /// Aggregate the records whose timestamp falls within `window` of now.
    fn summary<'a>(&'a self, window: Duration) -> MetricsFuture<'a, MetricsSummary>;
}

/// In-process recorder holding a bounded buffer of recent metrics.
///
/// Enough for the proxy's rolling five-minute health summary; durable
/// metrics live in `gridfeed-store`.
#[derive(Debug)]
pub struct MemoryMetricsRecorder {
    capacity: usize,
    records: Mutex<VecDeque<ApiMetric>>,
}

impl Default for MemoryMetricsRecorder {
    fn default() -> Self {
        Self::new(4_096)
    }
}

impl MemoryMetricsRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn recorded(&self) -> Vec<ApiMetric> {
        self.records
            .lock()
            .expect("metrics buffer lock is not poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

impl MetricsRecorder for MemoryMetricsRecorder {
    fn record<'a>(&'a self, metric: ApiMetric) -> MetricsFuture<'a, ()> {
        Box::pin(async move {
            let mut records = self
                .records
                .lock()
                .expect("metrics buffer lock is not poisoned");
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(metric);
            Ok(())
        })
    }

    fn summary<'a>(&'a self, window: Duration) -> MetricsFuture<'a, MetricsSummary> {
        Box::pin(async move {
            let now = UtcDateTime::now();
            let window_secs = window.as_secs();
            let records = self
                .records
                .lock()
                .expect("metrics buffer lock is not poisoned");

            let mut summary = MetricsSummary {
                window_secs,
                ..MetricsSummary::default()
            };
            let mut latency_total: u128 = 0;

            for metric in records.iter() {
                if now.seconds_since(metric.timestamp) > window_secs {
                    continue;
                }
                summary.total_requests += 1;
                if metric.cache_hit {
                    summary.cache_hits += 1;
                }
                if metric.error.is_some() {
                    summary.errors += 1;
                }
                latency_total += u128::from(metric.latency_ms);
            }

            if summary.total_requests > 0 {
                summary.avg_latency_ms =
                    (latency_total / u128::from(summary.total_requests)) as u64;
            }

            Ok(summary)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn summary_aggregates_recent_records() {
        let recorder = MemoryMetricsRecorder::default();

        recorder
            .record(ApiMetric::hit(EndpointKind::State, 3))
            .await
            .expect("record");
        recorder
            .record(ApiMetric::miss(EndpointKind::State, 200, 41))
            .await
            .expect("record");
        recorder
            .record(ApiMetric::error(EndpointKind::Players, 12, "upstream down"))
            .await
            .expect("record");

        let summary = recorder
            .summary(Duration::from_secs(300))
            .await
            .expect("summary");
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.avg_latency_ms, (3 + 41 + 12) / 3);
    }

    #[tokio::test]
    async fn buffer_is_bounded() {
        let recorder = MemoryMetricsRecorder::new(2);

        for _ in 0..5 {
            recorder
                .record(ApiMetric::hit(EndpointKind::State, 1))
                .await
                .expect("record");
        }

        assert_eq!(recorder.recorded().len(), 2);
    }
}
