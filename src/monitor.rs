// Lightweight in-process performance tracking.
//
// Every tool invocation is bracketed by `start`/`finish`. Finished timings
// land in a bounded history window used for percentile math, while lifetime
// counters accumulate per operation without a cap. Monitoring never fails
// the monitored operation: every method here is total.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;

/// Handle for one in-flight operation. Pass it back to `finish`; a token
/// dropped without finishing still returns the active gauge to balance.
pub struct OperationToken {
    operation: String,
    started: Instant,
    concurrent: usize,
    active: Arc<AtomicUsize>,
    finished: bool,
}

impl OperationToken {
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for OperationToken {
    fn drop(&mut self) {
        if !self.finished {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone)]
struct OperationRecord {
    operation: String,
    duration: Duration,
    error_kind: Option<&'static str>,
    /// Operations already in flight when this one started.
    concurrent: usize,
}

#[derive(Debug, Default)]
struct Lifetime {
    count: u64,
    errors: u64,
    total: Duration,
}

/// Per-operation aggregate over the current history window.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub operation: String,
    pub count: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    pub active_operations: usize,
    pub total_operations: u64,
    pub window_size: usize,
    pub max_concurrent: usize,
    pub uptime_secs: f64,
    pub throughput_per_sec: f64,
    pub operations: Vec<OperationSummary>,
}

pub struct PerformanceMonitor {
    history: Mutex<VecDeque<OperationRecord>>,
    capacity: usize,
    lifetime: DashMap<String, Lifetime>,
    active: Arc<AtomicUsize>,
    total: AtomicU64,
    max_concurrent: AtomicUsize,
    started_at: Instant,
}

impl PerformanceMonitor {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            lifetime: DashMap::new(),
            active: Arc::new(AtomicUsize::new(0)),
            total: AtomicU64::new(0),
            max_concurrent: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// Mark an operation as started and bump the active gauge.
    pub fn start(&self, operation: &str) -> OperationToken {
        let concurrent = self.active.fetch_add(1, Ordering::SeqCst);
        self.max_concurrent
            .fetch_max(concurrent + 1, Ordering::SeqCst);
        OperationToken {
            operation: operation.to_string(),
            started: Instant::now(),
            concurrent,
            active: Arc::clone(&self.active),
            finished: false,
        }
    }

    /// Record the outcome for a previously started operation. `error_kind`
    /// is `None` on success.
    pub fn finish(&self, mut token: OperationToken, error_kind: Option<&'static str>) -> Duration {
        let duration = token.started.elapsed();
        token.finished = true;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::Relaxed);

        if duration > Duration::from_secs(30) {
            warn!(
                operation = %token.operation,
                duration_ms = duration.as_millis() as u64,
                "slow operation"
            );
        }

        {
            let mut agg = self.lifetime.entry(token.operation.clone()).or_default();
            agg.count += 1;
            if error_kind.is_some() {
                agg.errors += 1;
            }
            agg.total += duration;
        }

        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(OperationRecord {
            operation: std::mem::take(&mut token.operation),
            duration,
            error_kind,
            concurrent: token.concurrent,
        });
        duration
    }

    /// Operations currently between `start` and `finish`.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Lifetime invocation count for one operation, unaffected by history
    /// window rollover.
    pub fn lifetime_count(&self, operation: &str) -> u64 {
        self.lifetime
            .get(operation)
            .map(|agg| agg.count)
            .unwrap_or(0)
    }

    /// Aggregate view across the history window, one entry per operation.
    pub fn summary(&self) -> MonitorSummary {
        let history = self.history.lock();
        let mut per_op: std::collections::HashMap<&str, Vec<&OperationRecord>> =
            std::collections::HashMap::new();
        let mut max_concurrent = 0usize;
        for record in history.iter() {
            per_op
                .entry(record.operation.as_str())
                .or_default()
                .push(record);
            max_concurrent = max_concurrent.max(record.concurrent + 1);
        }

        let mut operations: Vec<OperationSummary> = per_op
            .into_iter()
            .map(|(operation, records)| {
                let mut millis: Vec<f64> = records
                    .iter()
                    .map(|r| r.duration.as_secs_f64() * 1000.0)
                    .collect();
                millis.sort_by(|a, b| a.total_cmp(b));
                let count = records.len() as u64;
                let errors = records.iter().filter(|r| r.error_kind.is_some()).count() as u64;
                let sum: f64 = millis.iter().sum();
                OperationSummary {
                    operation: operation.to_string(),
                    count,
                    errors,
                    success_rate: (count - errors) as f64 / count as f64,
                    avg_ms: sum / count as f64,
                    min_ms: millis[0],
                    max_ms: millis[millis.len() - 1],
                    median_ms: percentile(&millis, 50.0),
                    p95_ms: percentile(&millis, 95.0),
                    p99_ms: percentile(&millis, 99.0),
                }
            })
            .collect();
        operations.sort_by(|a, b| a.operation.cmp(&b.operation));

        let uptime = self.started_at.elapsed().as_secs_f64();
        let total = self.total.load(Ordering::Relaxed);
        MonitorSummary {
            active_operations: self.active(),
            total_operations: total,
            window_size: history.len(),
            max_concurrent: max_concurrent.max(self.max_concurrent.load(Ordering::SeqCst)),
            uptime_secs: uptime,
            throughput_per_sec: if uptime > 0.0 {
                total as f64 / uptime
            } else {
                0.0
            },
            operations,
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted sample.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn start_finish_records_duration() {
        let monitor = PerformanceMonitor::new(100);
        let token = monitor.start("search_hotels_by_location");
        assert_eq!(monitor.active(), 1);

        tokio::time::advance(Duration::from_millis(250)).await;
        let duration = monitor.finish(token, None);
        assert_eq!(duration, Duration::from_millis(250));
        assert_eq!(monitor.active(), 0);

        let summary = monitor.summary();
        assert_eq!(summary.total_operations, 1);
        assert_eq!(summary.operations[0].operation, "search_hotels_by_location");
        assert_eq!(summary.operations[0].avg_ms, 250.0);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_tracked_per_operation() {
        let monitor = PerformanceMonitor::new(100);
        for outcome in [None, None, Some("upstream"), None] {
            let token = monitor.start("search_hotel_offers");
            tokio::time::advance(Duration::from_millis(10)).await;
            monitor.finish(token, outcome);
        }

        let summary = monitor.summary();
        let op = &summary.operations[0];
        assert_eq!(op.count, 4);
        assert_eq!(op.errors, 1);
        assert!((op.success_rate - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn history_window_is_bounded() {
        let monitor = PerformanceMonitor::new(5);
        for _ in 0..20 {
            let token = monitor.start("search_hotels_by_location");
            tokio::time::advance(Duration::from_millis(1)).await;
            monitor.finish(token, None);
        }

        let summary = monitor.summary();
        assert_eq!(summary.window_size, 5);
        // Lifetime counters outlive window rollover.
        assert_eq!(monitor.lifetime_count("search_hotels_by_location"), 20);
        assert_eq!(summary.total_operations, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn percentiles_over_window() {
        let monitor = PerformanceMonitor::new(100);
        for ms in 1..=100u64 {
            let token = monitor.start("op");
            tokio::time::advance(Duration::from_millis(ms)).await;
            monitor.finish(token, None);
        }

        let summary = monitor.summary();
        let op = &summary.operations[0];
        assert_eq!(op.min_ms, 1.0);
        assert_eq!(op.max_ms, 100.0);
        assert_eq!(op.median_ms, 50.0);
        assert_eq!(op.p95_ms, 95.0);
        assert_eq!(op.p99_ms, 99.0);
    }

    #[test]
    fn percentile_edge_cases() {
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[7.0], 50.0), 7.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
    }

    #[tokio::test]
    async fn active_gauge_tracks_overlap() {
        let monitor = PerformanceMonitor::new(10);
        let t1 = monitor.start("a");
        let t2 = monitor.start("b");
        assert_eq!(monitor.active(), 2);
        monitor.finish(t1, None);
        assert_eq!(monitor.active(), 1);
        monitor.finish(t2, Some("timeout"));
        assert_eq!(monitor.active(), 0);
        assert!(monitor.summary().max_concurrent >= 2);
    }

    #[tokio::test]
    async fn dropped_token_releases_gauge_without_history() {
        let monitor = PerformanceMonitor::new(10);
        let token = monitor.start("abandoned");
        assert_eq!(monitor.active(), 1);
        drop(token);
        assert_eq!(monitor.active(), 0);
        assert_eq!(monitor.summary().window_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_history_keeps_lifetime_counters() {
        let monitor = PerformanceMonitor::new(10);
        let token = monitor.start("op");
        tokio::time::advance(Duration::from_millis(5)).await;
        monitor.finish(token, None);

        monitor.clear_history();
        assert_eq!(monitor.summary().window_size, 0);
        assert_eq!(monitor.lifetime_count("op"), 1);
        assert_eq!(monitor.summary().total_operations, 1);
    }
}
