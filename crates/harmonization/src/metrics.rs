//! Pipeline metrics.
//!
//! Counters are kept locally for summaries and mirrored to the `metrics`
//! facade. No exporter is installed here; the embedding process decides.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use harmonize_common::SourceId;
use metrics::{counter, histogram};
use serde::Serialize;

/// Metrics collector for the harmonizer.
#[derive(Debug, Default)]
pub struct HarmonizeMetrics {
    pub requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub source_failures: AtomicU64,
    pub errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub source_failures: u64,
    pub errors: u64,
}

impl HarmonizeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a harmonization request
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!("harmonize_requests_total").increment(1);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        counter!("harmonize_cache_hits_total").increment(1);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        counter!("harmonize_cache_misses_total").increment(1);
    }

    /// Record an unavailable source, labelled by source name
    pub fn record_source_failure(&self, source: SourceId) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
        counter!("harmonize_source_failures_total", "source" => source.as_str()).increment(1);
    }

    /// Record a request that ended in an error
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!("harmonize_errors_total").increment(1);
    }

    /// Record end-to-end request duration
    pub fn record_duration(&self, elapsed: Duration) {
        histogram!("harmonize_duration_seconds").record(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
