//! # Builder and Finder Statistics
//!
//! Thread-safe counters and timers for the graph builder and the affinity
//! group finder. Each builder and each finder owns one stats instance,
//! shared by `Arc` with whoever reports into or reads from it; there is no
//! process-wide registry.
//!
//! Counters are independent atomics: reads are always current, but no
//! consistent cross-counter snapshot is promised. The run-count identity
//! `runs == succeeded + failed + stopped` holds at every observation point
//! because the run count is derived as the sum of the three terminal
//! counters rather than tracked separately.

use crate::config::AffinityConfig;
use crate::model::RunStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters and timers owned by one graph builder.
///
/// Edge and vertex counts live in the graph itself; the owning builder
/// supplies them when producing a [`BuilderStatsSnapshot`].
#[derive(Debug)]
pub struct GraphBuilderStats {
    // Immutable configuration, exposed read-only.
    snapshot_count: usize,
    snapshot_period_ms: u64,

    update_count: AtomicU64,
    prune_count: AtomicU64,
    processing_nanos: AtomicU64,
}

impl GraphBuilderStats {
    /// Create a stats instance carrying the builder's static configuration.
    pub fn new(config: &AffinityConfig) -> Self {
        Self {
            snapshot_count: config.snapshot_count,
            snapshot_period_ms: config.snapshot_period_ms,
            update_count: AtomicU64::new(0),
            prune_count: AtomicU64::new(0),
            processing_nanos: AtomicU64::new(0),
        }
    }

    /// Number of graph updates applied.
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    /// Number of completed prune rotations.
    pub fn prune_count(&self) -> u64 {
        self.prune_count.load(Ordering::Relaxed)
    }

    /// Total time spent modifying the graph, in milliseconds.
    pub fn processing_time_ms(&self) -> u64 {
        self.processing_nanos.load(Ordering::Relaxed) / 1_000_000
    }

    /// The configured number of retained snapshot buckets.
    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    /// The configured snapshot bucket length, in milliseconds.
    pub fn snapshot_period_ms(&self) -> u64 {
        self.snapshot_period_ms
    }

    pub(crate) fn record_update(&self, elapsed: Duration) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        self.add_processing(elapsed);
    }

    pub(crate) fn record_prune(&self, elapsed: Duration) {
        self.prune_count.fetch_add(1, Ordering::Relaxed);
        self.add_processing(elapsed);
    }

    fn add_processing(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.processing_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Produce a plain snapshot, combining the counters with the live graph
    /// sizes supplied by the owning builder.
    pub fn snapshot(&self, vertex_count: usize, edge_count: usize) -> BuilderStatsSnapshot {
        BuilderStatsSnapshot {
            vertex_count,
            edge_count,
            update_count: self.update_count(),
            prune_count: self.prune_count(),
            processing_time_ms: self.processing_time_ms(),
            snapshot_count: self.snapshot_count,
            snapshot_period_ms: self.snapshot_period_ms,
        }
    }
}

/// Point-in-time view of a builder's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderStatsSnapshot {
    pub vertex_count: usize,
    pub edge_count: usize,
    pub update_count: u64,
    pub prune_count: u64,
    pub processing_time_ms: u64,
    pub snapshot_count: usize,
    pub snapshot_period_ms: u64,
}

/// One completed finder run, folded into [`GroupFinderStats`] on termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRecord {
    /// Terminal status of the run.
    pub status: RunStatus,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Label-propagation passes executed.
    pub iterations: u32,
    /// Groups produced; meaningful for succeeded runs only.
    pub groups: usize,
}

/// Counters and timers owned by one affinity group finder.
#[derive(Debug)]
pub struct GroupFinderStats {
    stop_iteration: u32,

    succeeded: AtomicU64,
    failed: AtomicU64,
    stopped: AtomicU64,
    /// Groups found by the latest successful run.
    number_groups: AtomicU64,
    // Run time and iteration aggregates cover successful runs only.
    total_run_nanos: AtomicU64,
    max_run_nanos: AtomicU64,
    total_iterations: AtomicU64,
    max_iterations: AtomicU64,
}

impl GroupFinderStats {
    /// Create a stats instance carrying the finder's static configuration.
    pub fn new(config: &AffinityConfig) -> Self {
        Self {
            stop_iteration: config.stop_iteration,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            stopped: AtomicU64::new(0),
            number_groups: AtomicU64::new(0),
            total_run_nanos: AtomicU64::new(0),
            max_run_nanos: AtomicU64::new(0),
            total_iterations: AtomicU64::new(0),
            max_iterations: AtomicU64::new(0),
        }
    }

    /// Total number of runs, including failed and stopped ones.
    pub fn number_runs(&self) -> u64 {
        self.number_succeeded() + self.number_failures() + self.number_stopped()
    }

    /// Number of runs that converged.
    pub fn number_succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Number of runs that aborted with an unrecoverable condition.
    pub fn number_failures(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Number of runs stopped by the iteration bound. A stopped run is not a
    /// failed run; it returned valid results.
    pub fn number_stopped(&self) -> u64 {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Groups found by the latest successful run.
    pub fn number_groups(&self) -> u64 {
        self.number_groups.load(Ordering::Relaxed)
    }

    /// Average duration of successful runs, in milliseconds.
    pub fn avg_run_time_ms(&self) -> u64 {
        let succeeded = self.number_succeeded();
        if succeeded == 0 {
            return 0;
        }
        self.total_run_nanos.load(Ordering::Relaxed) / succeeded / 1_000_000
    }

    /// Longest successful run, in milliseconds.
    pub fn max_run_time_ms(&self) -> u64 {
        self.max_run_nanos.load(Ordering::Relaxed) / 1_000_000
    }

    /// Average iterations over successful runs.
    pub fn avg_iterations(&self) -> u32 {
        let succeeded = self.number_succeeded();
        if succeeded == 0 {
            return 0;
        }
        u32::try_from(self.total_iterations.load(Ordering::Relaxed) / succeeded).unwrap_or(u32::MAX)
    }

    /// Most iterations taken by a successful run.
    pub fn max_iterations(&self) -> u32 {
        u32::try_from(self.max_iterations.load(Ordering::Relaxed)).unwrap_or(u32::MAX)
    }

    /// The configured iteration bound.
    pub fn stop_iteration(&self) -> u32 {
        self.stop_iteration
    }

    /// Fold one terminated run into the aggregates.
    pub(crate) fn record_run(&self, record: RunRecord) {
        match record.status {
            RunStatus::Succeeded => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.number_groups
                    .store(record.groups as u64, Ordering::Relaxed);
                let nanos = u64::try_from(record.duration.as_nanos()).unwrap_or(u64::MAX);
                self.total_run_nanos.fetch_add(nanos, Ordering::Relaxed);
                self.max_run_nanos.fetch_max(nanos, Ordering::Relaxed);
                self.total_iterations
                    .fetch_add(u64::from(record.iterations), Ordering::Relaxed);
                self.max_iterations
                    .fetch_max(u64::from(record.iterations), Ordering::Relaxed);
            }
            RunStatus::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            RunStatus::Stopped => {
                self.stopped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Produce a plain snapshot of all finder counters.
    pub fn snapshot(&self) -> FinderStatsSnapshot {
        FinderStatsSnapshot {
            number_groups: self.number_groups(),
            number_runs: self.number_runs(),
            number_succeeded: self.number_succeeded(),
            number_failures: self.number_failures(),
            number_stopped: self.number_stopped(),
            avg_run_time_ms: self.avg_run_time_ms(),
            max_run_time_ms: self.max_run_time_ms(),
            avg_iterations: self.avg_iterations(),
            max_iterations: self.max_iterations(),
            stop_iteration: self.stop_iteration,
        }
    }
}

/// Point-in-time view of a finder's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinderStatsSnapshot {
    pub number_groups: u64,
    pub number_runs: u64,
    pub number_succeeded: u64,
    pub number_failures: u64,
    pub number_stopped: u64,
    pub avg_run_time_ms: u64,
    pub max_run_time_ms: u64,
    pub avg_iterations: u32,
    pub max_iterations: u32,
    pub stop_iteration: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AffinityConfig {
        AffinityConfig::new(1000, 3, 7).unwrap()
    }

    #[test]
    fn test_builder_stats_accumulate() {
        let stats = GraphBuilderStats::new(&config());
        stats.record_update(Duration::from_millis(2));
        stats.record_update(Duration::from_millis(3));
        stats.record_prune(Duration::from_millis(1));

        assert_eq!(stats.update_count(), 2);
        assert_eq!(stats.prune_count(), 1);
        assert_eq!(stats.processing_time_ms(), 6);
        assert_eq!(stats.snapshot_count(), 3);
        assert_eq!(stats.snapshot_period_ms(), 1000);
    }

    #[test]
    fn test_builder_snapshot_carries_graph_sizes() {
        let stats = GraphBuilderStats::new(&config());
        let snapshot = stats.snapshot(4, 6);
        assert_eq!(snapshot.vertex_count, 4);
        assert_eq!(snapshot.edge_count, 6);
        assert_eq!(snapshot.snapshot_count, 3);
    }

    #[test]
    fn test_run_count_is_sum_of_terminal_counters() {
        let stats = GroupFinderStats::new(&config());
        stats.record_run(RunRecord {
            status: RunStatus::Succeeded,
            duration: Duration::from_millis(10),
            iterations: 3,
            groups: 2,
        });
        stats.record_run(RunRecord {
            status: RunStatus::Failed,
            duration: Duration::from_millis(1),
            iterations: 0,
            groups: 0,
        });
        stats.record_run(RunRecord {
            status: RunStatus::Stopped,
            duration: Duration::from_millis(50),
            iterations: 7,
            groups: 4,
        });

        assert_eq!(stats.number_runs(), 3);
        assert_eq!(stats.number_succeeded(), 1);
        assert_eq!(stats.number_failures(), 1);
        assert_eq!(stats.number_stopped(), 1);
        // Only the successful run feeds the group count and aggregates.
        assert_eq!(stats.number_groups(), 2);
        assert_eq!(stats.max_iterations(), 3);
    }

    #[test]
    fn test_avg_never_exceeds_max() {
        let stats = GroupFinderStats::new(&config());
        for millis in [5u64, 10, 30] {
            stats.record_run(RunRecord {
                status: RunStatus::Succeeded,
                duration: Duration::from_millis(millis),
                iterations: 2,
                groups: 1,
            });
        }
        assert!(stats.avg_run_time_ms() <= stats.max_run_time_ms());
        assert_eq!(stats.avg_iterations(), 2);
        assert_eq!(stats.max_run_time_ms(), 30);
    }

    #[test]
    fn test_empty_stats_report_zero() {
        let stats = GroupFinderStats::new(&config());
        assert_eq!(stats.number_runs(), 0);
        assert_eq!(stats.avg_run_time_ms(), 0);
        assert_eq!(stats.avg_iterations(), 0);
        assert_eq!(stats.stop_iteration(), 7);
    }
}
