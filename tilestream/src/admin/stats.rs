//! Tile request statistics.
//!
//! Cumulative counters are lock-free `AtomicU64`s shared by every request task.
//! Gauges (active / pending requests) are owned by the dispatcher and supplied
//! when a snapshot is taken.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters.
#[derive(Debug, Default)]
pub struct TileStatistics {
    dispatched: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    aborted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    empty: AtomicU64,
    undisplayable: AtomicU64,
}

impl TileStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One attempt of a request was sent (retries count again).
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undisplayable(&self) {
        self.undisplayable.fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes every cumulative counter.
    pub fn reset(&self) {
        for counter in [
            &self.dispatched,
            &self.cache_hits,
            &self.cache_misses,
            &self.aborted,
            &self.completed,
            &self.failed,
            &self.timed_out,
            &self.empty,
            &self.undisplayable,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(
        &self,
        num_active_requests: usize,
        num_pending_requests: usize,
    ) -> TileStatisticsSnapshot {
        TileStatisticsSnapshot {
            num_active_requests,
            num_pending_requests,
            total_dispatched_requests: self.dispatched.load(Ordering::Relaxed),
            total_cache_hits: self.cache_hits.load(Ordering::Relaxed),
            total_cache_misses: self.cache_misses.load(Ordering::Relaxed),
            total_aborted_requests: self.aborted.load(Ordering::Relaxed),
            total_completed_requests: self.completed.load(Ordering::Relaxed),
            total_failed_requests: self.failed.load(Ordering::Relaxed),
            total_timed_out_requests: self.timed_out.load(Ordering::Relaxed),
            total_empty_tiles: self.empty.load(Ordering::Relaxed),
            total_undisplayable_tiles: self.undisplayable.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileStatisticsSnapshot {
    pub num_active_requests: usize,
    pub num_pending_requests: usize,
    pub total_dispatched_requests: u64,
    pub total_cache_hits: u64,
    pub total_cache_misses: u64,
    pub total_aborted_requests: u64,
    pub total_completed_requests: u64,
    pub total_failed_requests: u64,
    pub total_timed_out_requests: u64,
    pub total_empty_tiles: u64,
    pub total_undisplayable_tiles: u64,
}

impl fmt::Display for TileStatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "active requests:      {}", self.num_active_requests)?;
        writeln!(f, "pending requests:     {}", self.num_pending_requests)?;
        writeln!(f, "dispatched:           {}", self.total_dispatched_requests)?;
        writeln!(
            f,
            "cache hits / misses:  {} / {}",
            self.total_cache_hits, self.total_cache_misses
        )?;
        writeln!(f, "completed:            {}", self.total_completed_requests)?;
        writeln!(f, "failed:               {}", self.total_failed_requests)?;
        writeln!(f, "timed out:            {}", self.total_timed_out_requests)?;
        writeln!(f, "aborted:              {}", self.total_aborted_requests)?;
        writeln!(f, "empty tiles:          {}", self.total_empty_tiles)?;
        write!(f, "undisplayable tiles:  {}", self.total_undisplayable_tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let stats = TileStatistics::new();
        stats.record_dispatch();
        stats.record_dispatch();
        stats.record_cache_miss();
        stats.record_timeout();

        let snapshot = stats.snapshot(1, 4);
        assert_eq!(snapshot.total_dispatched_requests, 2);
        assert_eq!(snapshot.total_cache_misses, 1);
        assert_eq!(snapshot.total_timed_out_requests, 1);
        assert_eq!(snapshot.num_active_requests, 1);
        assert_eq!(snapshot.num_pending_requests, 4);

        stats.reset();
        let snapshot = stats.snapshot(0, 0);
        assert_eq!(snapshot, TileStatisticsSnapshot::default());
    }

    #[test]
    fn test_snapshot_display() {
        let display = TileStatistics::new().snapshot(2, 3).to_string();
        assert!(display.contains("active requests:      2"));
        assert!(display.contains("pending requests:     3"));
    }
}
