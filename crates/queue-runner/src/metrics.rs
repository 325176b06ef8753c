use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerMetrics {
    pub items_processed: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
}

/// Aggregate statistics for one `ConcurrentRunner::run()` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub items_processed: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
    pub items_discovered: u64,
    pub retry_count: u64,
    pub backoff_events: u64,
    pub status: String,
    pub worker_metrics: HashMap<String, WorkerMetrics>,
}

/// Shared, lock-light counters workers update as they process items; only
/// materialized into a `RunMetrics` snapshot on demand.
pub struct SharedMetrics {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    items_processed: AtomicU64,
    items_succeeded: AtomicU64,
    items_failed: AtomicU64,
    items_discovered: AtomicU64,
    retry_count: AtomicU64,
    backoff_events: AtomicU64,
    per_worker: DashMap<String, WorkerMetrics>,
}

impl SharedMetrics {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            items_processed: AtomicU64::new(0),
            items_succeeded: AtomicU64::new(0),
            items_failed: AtomicU64::new(0),
            items_discovered: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            backoff_events: AtomicU64::new(0),
            per_worker: DashMap::new(),
        }
    }

    pub fn record_success(&self, worker_id: &str) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
        self.items_succeeded.fetch_add(1, Ordering::Relaxed);
        self.per_worker.entry(worker_id.to_string()).or_default().items_succeeded += 1;
        self.per_worker.entry(worker_id.to_string()).or_default().items_processed += 1;
    }

    pub fn record_failure(&self, worker_id: &str) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        self.per_worker.entry(worker_id.to_string()).or_default().items_failed += 1;
        self.per_worker.entry(worker_id.to_string()).or_default().items_processed += 1;
    }

    pub fn record_discovery(&self, count: u64) {
        self.items_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff_event(&self) {
        self.backoff_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, status: &str, ended_at: Option<DateTime<Utc>>) -> RunMetrics {
        RunMetrics {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            ended_at,
            items_processed: self.items_processed.load(Ordering::Relaxed),
            items_succeeded: self.items_succeeded.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            items_discovered: self.items_discovered.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            backoff_events: self.backoff_events.load(Ordering::Relaxed),
            status: status.to_string(),
            worker_metrics: self
                .per_worker
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_increment_totals_and_per_worker() {
        let metrics = SharedMetrics::new("run-1".to_string());
        metrics.record_success("w0");
        metrics.record_failure("w0");
        metrics.record_success("w1");

        let snapshot = metrics.snapshot("running", None);
        assert_eq!(snapshot.items_processed, 3);
        assert_eq!(snapshot.items_succeeded, 2);
        assert_eq!(snapshot.items_failed, 1);
        assert_eq!(snapshot.worker_metrics["w0"].items_processed, 2);
        assert_eq!(snapshot.worker_metrics["w1"].items_processed, 1);
    }
}
