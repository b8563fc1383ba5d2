//! Rolling per-stream statistics over a sliding time window
//!
//! Records land in per-minute buckets keyed by minute index; every bucket
//! field is an atomic, so ingestion never takes a lock and snapshot reads
//! never block ingestion. Buckets older than the window are evicted
//! opportunistically on record and snapshot.
//!
//! Percentiles come from a fixed-boundary duration histogram merged across
//! live buckets, with linear interpolation inside the containing slot. The
//! estimate is therefore approximate: error is bounded by the width of the
//! containing slot (the unbounded tail slot reports its lower edge). This
//! trades exactness for O(1) ingest and bounded memory per bucket.

use crate::model::RecordStatus;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MINUTE_MS: u64 = 60_000;

/// Upper bounds (inclusive, milliseconds) of the duration histogram slots.
/// One unbounded slot follows the last entry.
pub const DURATION_SLOT_BOUNDS_MS: [u64; 15] = [
    1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000,
];

const SLOT_COUNT: usize = DURATION_SLOT_BOUNDS_MS.len() + 1;

struct MinuteBucket {
    success: AtomicU64,
    error: AtomicU64,
    duration_sum_ms: AtomicU64,
    histogram: [AtomicU64; SLOT_COUNT],
}

impl Default for MinuteBucket {
    fn default() -> Self {
        Self {
            success: AtomicU64::new(0),
            error: AtomicU64::new(0),
            duration_sum_ms: AtomicU64::new(0),
            histogram: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl MinuteBucket {
    fn record(&self, status: RecordStatus, duration_ms: u64) {
        match status {
            RecordStatus::Success => self.success.fetch_add(1, Ordering::Relaxed),
            RecordStatus::Error => self.error.fetch_add(1, Ordering::Relaxed),
        };
        self.duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.histogram[slot_index(duration_ms)].fetch_add(1, Ordering::Relaxed);
    }
}

fn slot_index(duration_ms: u64) -> usize {
    DURATION_SLOT_BOUNDS_MS
        .iter()
        .position(|&bound| duration_ms <= bound)
        .unwrap_or(DURATION_SLOT_BOUNDS_MS.len())
}

/// Summary statistics over the records in a window
#[derive(Debug, Clone, Serialize)]
pub struct SummarySnapshot {
    pub total_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Percent, 0-100
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: Option<f64>,
    pub p99_duration_ms: Option<f64>,
    /// Records per hour over the window
    pub per_hour: f64,
    /// Composite health score, 0-100
    pub performance_score: f64,
    pub window_seconds: u64,
}

/// Rolling statistics for one record stream (commands or RPC calls)
pub struct StreamStats {
    buckets: DashMap<u64, MinuteBucket>,
    window_minutes: AtomicU64,
    last_evicted_minute: AtomicU64,
}

impl StreamStats {
    pub fn new(window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            window_minutes: AtomicU64::new(window_to_minutes(window)),
            last_evicted_minute: AtomicU64::new(0),
        }
    }

    /// Reconfigure the trailing window (applies from the next record/snapshot)
    pub fn set_window(&self, window: Duration) {
        self.window_minutes
            .store(window_to_minutes(window), Ordering::Relaxed);
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes.load(Ordering::Relaxed) * 60)
    }

    /// Fold one completed record into its minute bucket. O(1) amortized;
    /// records already outside the window are dropped instead of creating a
    /// bucket that the next eviction would reap.
    pub fn record(&self, status: RecordStatus, timestamp_ms: u64, duration_ms: u64, now_ms: u64) {
        let window_minutes = self.window_minutes.load(Ordering::Relaxed);
        let now_minute = now_ms / MINUTE_MS;
        let minute = timestamp_ms / MINUTE_MS;

        if minute < now_minute.saturating_sub(window_minutes) {
            return;
        }

        self.maybe_evict(now_minute, window_minutes);

        self.buckets
            .entry(minute)
            .or_default()
            .record(status, duration_ms);
    }

    /// Drop buckets older than the window, at most once per minute of
    /// wall-clock progress. Age arithmetic saturates; a clock stepping
    /// backwards clamps to zero rather than underflowing.
    fn maybe_evict(&self, now_minute: u64, window_minutes: u64) {
        let last = self.last_evicted_minute.load(Ordering::Relaxed);
        if now_minute <= last {
            return;
        }
        if self
            .last_evicted_minute
            .compare_exchange(last, now_minute, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let cutoff = now_minute.saturating_sub(window_minutes);
        self.buckets.retain(|&minute, _| minute >= cutoff);
    }

    /// Merge live buckets into a summary over the configured window.
    ///
    /// Lock-free with respect to ingestion; a concurrent record may land in
    /// a bucket mid-merge, so two snapshots taken back-to-back can differ
    /// (eventual consistency across buckets). `total_count` is derived from
    /// the success/error counters so the count invariant holds at any
    /// observation instant.
    pub fn snapshot(&self, now_ms: u64) -> SummarySnapshot {
        self.snapshot_over(self.window(), now_ms)
    }

    /// Summary over a narrower window than configured (clamped to it).
    pub fn snapshot_over(&self, window: Duration, now_ms: u64) -> SummarySnapshot {
        let configured = self.window_minutes.load(Ordering::Relaxed);
        let window_minutes = window_to_minutes(window).min(configured);
        let now_minute = now_ms / MINUTE_MS;

        self.maybe_evict(now_minute, configured);

        let cutoff = now_minute.saturating_sub(window_minutes);

        let mut success_count = 0u64;
        let mut error_count = 0u64;
        let mut duration_sum = 0u64;
        let mut histogram = [0u64; SLOT_COUNT];

        for entry in self.buckets.iter() {
            if *entry.key() < cutoff {
                continue;
            }
            let bucket = entry.value();
            success_count += bucket.success.load(Ordering::Relaxed);
            error_count += bucket.error.load(Ordering::Relaxed);
            duration_sum += bucket.duration_sum_ms.load(Ordering::Relaxed);
            for (slot, merged) in bucket.histogram.iter().zip(histogram.iter_mut()) {
                *merged += slot.load(Ordering::Relaxed);
            }
        }

        let total_count = success_count + error_count;
        let window_seconds = window_minutes * 60;

        let (success_rate, avg_duration_ms, per_hour, performance_score) = if total_count > 0 {
            let success_rate = success_count as f64 / total_count as f64 * 100.0;
            let avg = duration_sum as f64 / total_count as f64;
            let per_hour = total_count as f64 / (window_seconds as f64 / 3600.0);
            let latency_score = 100.0 / (1.0 + avg / 1000.0);
            let score = 0.7 * success_rate + 0.3 * latency_score;
            (success_rate, avg, per_hour, score)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };

        SummarySnapshot {
            total_count,
            success_count,
            error_count,
            success_rate,
            avg_duration_ms,
            p95_duration_ms: histogram_percentile(&histogram, 0.95),
            p99_duration_ms: histogram_percentile(&histogram, 0.99),
            per_hour,
            performance_score,
            window_seconds,
        }
    }
}

fn window_to_minutes(window: Duration) -> u64 {
    (window.as_secs() / 60).max(1)
}

/// Estimate a percentile from merged histogram slots by linear interpolation
/// within the slot containing the target rank. The unbounded tail slot has
/// no upper edge to interpolate toward; its lower edge is reported instead.
fn histogram_percentile(histogram: &[u64; SLOT_COUNT], percentile: f64) -> Option<f64> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }

    let target_rank = ((percentile * total as f64).ceil() as u64).max(1);

    let mut cumulative = 0u64;
    let mut prev_bound = 0.0;

    for (i, &count) in histogram.iter().enumerate() {
        if count > 0 && cumulative + count >= target_rank {
            let upper = match DURATION_SLOT_BOUNDS_MS.get(i) {
                Some(&bound) => bound as f64,
                None => return Some(prev_bound),
            };
            let rank_in_slot = (target_rank - cumulative) as f64;
            let fraction = rank_in_slot / count as f64;
            return Some(prev_bound + fraction * (upper - prev_bound));
        }
        cumulative += count;
        if let Some(&bound) = DURATION_SLOT_BOUNDS_MS.get(i) {
            prev_bound = bound as f64;
        }
    }

    Some(prev_bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;
    const DAY: Duration = Duration::from_secs(24 * 3600);

    #[test]
    fn test_count_invariant() {
        let stats = StreamStats::new(DAY);
        for i in 0..60u64 {
            let status = if i % 3 == 0 {
                RecordStatus::Error
            } else {
                RecordStatus::Success
            };
            stats.record(status, NOW - i * 1000, 10 + i, NOW);
        }

        let snapshot = stats.snapshot(NOW);
        assert_eq!(
            snapshot.success_count + snapshot.error_count,
            snapshot.total_count
        );
        assert_eq!(snapshot.total_count, 60);
        assert_eq!(snapshot.error_count, 20);
    }

    #[test]
    fn test_empty_window() {
        let stats = StreamStats::new(DAY);
        let snapshot = stats.snapshot(NOW);

        assert_eq!(snapshot.total_count, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.performance_score, 0.0);
        assert!(snapshot.p95_duration_ms.is_none());
        assert!(snapshot.p99_duration_ms.is_none());
    }

    #[test]
    fn test_out_of_window_record_dropped() {
        let stats = StreamStats::new(Duration::from_secs(3600));
        stats.record(RecordStatus::Success, NOW - 2 * 3600 * 1000, 5, NOW);

        assert_eq!(stats.snapshot(NOW).total_count, 0);
    }

    #[test]
    fn test_eviction_on_time_advance() {
        let stats = StreamStats::new(Duration::from_secs(3600));
        stats.record(RecordStatus::Success, NOW, 5, NOW);
        assert_eq!(stats.snapshot(NOW).total_count, 1);

        // Two hours later the bucket has aged out of the window.
        let later = NOW + 2 * 3600 * 1000;
        stats.record(RecordStatus::Success, later, 5, later);
        let snapshot = stats.snapshot(later);
        assert_eq!(snapshot.total_count, 1);
        assert_eq!(stats.buckets.len(), 1);
    }

    #[test]
    fn test_clock_skew_clamps() {
        let stats = StreamStats::new(DAY);
        // A timestamp ahead of the wall clock must not underflow eviction math.
        stats.record(RecordStatus::Success, NOW + 5 * 60_000, 5, NOW);
        assert_eq!(stats.snapshot(NOW).total_count, 1);

        // Neither must a wall clock near epoch.
        let early = StreamStats::new(DAY);
        early.record(RecordStatus::Success, 30_000, 5, 30_000);
        assert_eq!(early.snapshot(30_000).total_count, 1);
    }

    #[test]
    fn test_percentiles_over_known_durations() {
        let stats = StreamStats::new(DAY);
        // 1000 durations, 1..=1000 ms, uniformly distributed.
        for d in 1..=1000u64 {
            stats.record(RecordStatus::Success, NOW, d, NOW);
        }

        let snapshot = stats.snapshot(NOW);
        // Uniform spread interpolates exactly at the slot resolution: the
        // order statistics are 950 and 990.
        let p95 = snapshot.p95_duration_ms.unwrap();
        let p99 = snapshot.p99_duration_ms.unwrap();
        assert!((p95 - 950.0).abs() < 1.0, "p95 was {}", p95);
        assert!((p99 - 990.0).abs() < 1.0, "p99 was {}", p99);
        assert!((snapshot.avg_duration_ms - 500.5).abs() < 0.01);
    }

    #[test]
    fn test_tail_slot_reports_lower_edge() {
        let stats = StreamStats::new(DAY);
        stats.record(RecordStatus::Success, NOW, 120_000, NOW);

        let snapshot = stats.snapshot(NOW);
        assert_eq!(snapshot.p99_duration_ms, Some(60_000.0));
    }

    #[test]
    fn test_narrower_snapshot_window() {
        let stats = StreamStats::new(DAY);
        stats.record(RecordStatus::Success, NOW - 2 * 3600 * 1000, 5, NOW);
        stats.record(RecordStatus::Success, NOW - 60_000, 5, NOW);

        let full = stats.snapshot(NOW);
        assert_eq!(full.total_count, 2);

        let last_hour = stats.snapshot_over(Duration::from_secs(3600), NOW);
        assert_eq!(last_hour.total_count, 1);
        assert_eq!(last_hour.window_seconds, 3600);
    }

    #[test]
    fn test_window_reconfiguration() {
        let stats = StreamStats::new(DAY);
        stats.set_window(Duration::from_secs(3600));
        assert_eq!(stats.window(), Duration::from_secs(3600));

        stats.record(RecordStatus::Success, NOW - 2 * 3600 * 1000, 5, NOW);
        assert_eq!(stats.snapshot(NOW).total_count, 0);
    }

    #[test]
    fn test_slot_index_boundaries() {
        assert_eq!(slot_index(0), 0);
        assert_eq!(slot_index(1), 0);
        assert_eq!(slot_index(2), 1);
        assert_eq!(slot_index(60_000), DURATION_SLOT_BOUNDS_MS.len() - 1);
        assert_eq!(slot_index(60_001), DURATION_SLOT_BOUNDS_MS.len());
    }

    #[test]
    fn test_performance_score_bounds() {
        let stats = StreamStats::new(DAY);
        for _ in 0..10 {
            stats.record(RecordStatus::Success, NOW, 1, NOW);
        }
        let healthy = stats.snapshot(NOW);
        assert!(healthy.performance_score > 90.0);
        assert!(healthy.performance_score <= 100.0);

        let failing = StreamStats::new(DAY);
        for _ in 0..10 {
            failing.record(RecordStatus::Error, NOW, 60_000, NOW);
        }
        let snapshot = failing.snapshot(NOW);
        assert!(snapshot.performance_score < 5.0);
    }
}
