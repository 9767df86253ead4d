//! Metrics and observability for the extraction pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};

/// How the GPS section of one extraction turned out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsOutcome {
    Resolved,
    Absent,
    /// Present but malformed; recorded without coordinates
    Degraded,
}

/// Pipeline counters
#[derive(Default)]
pub struct Metrics {
    pub total_extractions: AtomicU64,
    pub successful_extractions: AtomicU64,
    pub failed_extractions: AtomicU64,
    pub total_latency_ms: AtomicU64,
    pub backups_created: AtomicU64,

    // GPS outcomes of extractions that reached the resolver
    pub gps_resolved: AtomicU64,
    pub gps_absent: AtomicU64,
    pub gps_degraded: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_extraction(&self, success: bool, latency_ms: u64) {
        self.total_extractions.fetch_add(1, Ordering::Relaxed);

        if success {
            self.successful_extractions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_extractions.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_backup(&self) {
        self.backups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gps(&self, outcome: GpsOutcome) {
        let counter = match outcome {
            GpsOutcome::Resolved => &self.gps_resolved,
            GpsOutcome::Absent => &self.gps_absent,
            GpsOutcome::Degraded => &self.gps_degraded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_extractions.load(Ordering::Relaxed);
        let failed = self.failed_extractions.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_extractions: total,
            successful_extractions: self.successful_extractions.load(Ordering::Relaxed),
            failed_extractions: failed,
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
            backups_created: self.backups_created.load(Ordering::Relaxed),
            gps: GpsMetrics {
                resolved: self.gps_resolved.load(Ordering::Relaxed),
                absent: self.gps_absent.load(Ordering::Relaxed),
                degraded: self.gps_degraded.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_extractions: u64,
    pub successful_extractions: u64,
    pub failed_extractions: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
    pub backups_created: u64,
    pub gps: GpsMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsMetrics {
    pub resolved: u64,
    pub absent: u64,
    pub degraded: u64,
}

/// Timer for tracking operation latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
