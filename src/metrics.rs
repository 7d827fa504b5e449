//! Request and decision counters for the eligibility service.

use crate::types::Eligibility;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// In-process service counters
pub struct ServiceMetrics {
    /// Requests received, by endpoint
    requests_by_endpoint: RwLock<BTreeMap<String, u64>>,
    /// Requests rejected as client errors
    pub rejected_requests: AtomicU64,
    /// Requests that failed with an internal error
    pub failed_requests: AtomicU64,
    /// Rows scored as eligible
    pub eligible: AtomicU64,
    /// Rows scored as not eligible
    pub not_eligible: AtomicU64,
    /// Scoring times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_by_endpoint: RwLock::new(BTreeMap::new()),
            rejected_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            eligible: AtomicU64::new(0),
            not_eligible: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record an incoming request
    pub fn record_request(&self, endpoint: &str) {
        if let Ok(mut by_endpoint) = self.requests_by_endpoint.write() {
            *by_endpoint.entry(endpoint.to_string()).or_insert(0) += 1;
        }
    }

    /// Record the decisions of one scored request
    pub fn record_decisions(&self, decisions: &[Eligibility], processing_time: Duration) {
        let eligible = decisions
            .iter()
            .filter(|d| **d == Eligibility::Eligible)
            .count() as u64;
        self.eligible.fetch_add(eligible, Ordering::Relaxed);
        self.not_eligible
            .fetch_add(decisions.len() as u64 - eligible, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record a request that ended in an error response
    pub fn record_error(&self, client_error: bool) {
        if client_error {
            self.rejected_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests: self
                .requests_by_endpoint
                .read()
                .map(|r| r.clone())
                .unwrap_or_default(),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            eligible: self.eligible.load(Ordering::Relaxed),
            not_eligible: self.not_eligible.load(Ordering::Relaxed),
            processing: self.get_processing_stats(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let scored = snapshot.eligible + snapshot.not_eligible;
        let approval_rate = if scored > 0 {
            (snapshot.eligible as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        info!(
            uptime_secs = snapshot.uptime_secs,
            requests = ?snapshot.requests,
            rejected = snapshot.rejected_requests,
            failed = snapshot.failed_requests,
            scored = scored,
            approval_rate = format!("{:.1}%", approval_rate),
            mean_us = snapshot.processing.mean_us,
            p95_us = snapshot.processing.p95_us,
            p99_us = snapshot.processing.p99_us,
            "Service metrics summary"
        );
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: BTreeMap<String, u64>,
    pub rejected_requests: u64,
    pub failed_requests: u64,
    pub eligible: u64,
    pub not_eligible: u64,
    pub processing: ProcessingStats,
}

/// Logs a metrics summary at a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_counting() {
        let metrics = ServiceMetrics::new();

        metrics.record_request("predict_csv");
        metrics.record_decisions(
            &[Eligibility::Eligible, Eligibility::NotEligible, Eligibility::Eligible],
            Duration::from_micros(250),
        );
        metrics.record_error(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests["predict_csv"], 1);
        assert_eq!(snapshot.eligible, 2);
        assert_eq!(snapshot.not_eligible, 1);
        assert_eq!(snapshot.rejected_requests, 1);
        assert_eq!(snapshot.failed_requests, 0);
        assert_eq!(snapshot.processing.count, 1);
        assert_eq!(snapshot.processing.max_us, 250);
    }

    #[test]
    fn test_empty_stats() {
        let stats = ServiceMetrics::new().get_processing_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99_us, 0);
    }
}
