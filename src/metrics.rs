//! Metrics for the raw_bridge service surface

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Request counters shared by every handler
#[derive(Default)]
pub struct Metrics {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub total_latency_ms: AtomicU64,

    // Per-operation counters
    pub thumbnail_count: AtomicU64,
    pub rgb_count: AtomicU64,
    pub probe_count: AtomicU64,
    pub version_count: AtomicU64,

    failures_by_kind: Mutex<HashMap<ErrorKind, u64>>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, op: &str, success: bool, latency_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);

        match op {
            "raw.thumbnail" => self.thumbnail_count.fetch_add(1, Ordering::Relaxed),
            "raw.rgb" => self.rgb_count.fetch_add(1, Ordering::Relaxed),
            "raw.probe" => self.probe_count.fetch_add(1, Ordering::Relaxed),
            "raw.version" => self.version_count.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    pub fn record_failure(&self, kind: ErrorKind) {
        if let Ok(mut map) = self.failures_by_kind.lock() {
            *map.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let failures = self
            .failures_by_kind
            .lock()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();

        MetricsSnapshot {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
            operations: OperationMetrics {
                thumbnail: self.thumbnail_count.load(Ordering::Relaxed),
                rgb: self.rgb_count.load(Ordering::Relaxed),
                probe: self.probe_count.load(Ordering::Relaxed),
                version: self.version_count.load(Ordering::Relaxed),
            },
            failures,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
    pub operations: OperationMetrics,
    /// Failure counts keyed by error kind name
    pub failures: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub thumbnail: u64,
    pub rgb: u64,
    pub probe: u64,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.record_request("raw.rgb", true, 10);
        metrics.record_request("raw.thumbnail", false, 30);
        metrics.record_failure(ErrorKind::NotJpeg);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.avg_latency_ms, 20);
        assert_eq!(snap.operations.rgb, 1);
        assert_eq!(snap.operations.thumbnail, 1);
        assert_eq!(snap.failures.get("NotJpeg"), Some(&1));
        assert!((snap.error_rate - 0.5).abs() < f64::EPSILON);
    }
}
