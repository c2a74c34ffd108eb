//! # Affinity Group Finder
//!
//! Clusters a snapshot of the identity-contention graph into affinity groups
//! with bounded, deterministic label propagation.
//!
//! Every vertex starts with its own ordinal as label. Each pass, every vertex
//! adopts the label with the greatest total incident edge weight among its
//! neighbors' previous-pass labels; ties break to the smallest label value.
//! A pass that changes nothing means convergence (SUCCEEDED). Hitting the
//! configured iteration bound first stops the run (STOPPED) and returns the
//! current labeling, which is still a valid partition. Runs abort (FAILED)
//! only when the snapshot source errors or cancellation is requested; a
//! failed run publishes nothing and the previous partition remains in place.
//!
//! At most one run is active at a time. A trigger while a run is active is
//! rejected, never queued.

use crate::error::AffinityError;
use crate::graph::AffinityGraph;
use crate::model::{AffinityGroup, GroupId, Identity, RunStatus};
use crate::stats::{GroupFinderStats, RunRecord};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Provider of graph snapshots for finder runs.
///
/// Implemented by builders with a local graph; deployments without one can
/// wire in an aggregating proxy. A failing source turns the run into a
/// FAILED run rather than an error on the trigger call.
pub trait GraphSource: Send + Sync {
    /// Take a consistent, read-only snapshot of the current graph.
    fn graph_snapshot(&self) -> Result<AffinityGraph, AffinityError>;
}

/// Outcome of one finder run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinderResult {
    /// Terminal status of the run.
    pub status: RunStatus,
    /// The partition found, sorted by group id with members in identity
    /// order. Empty for failed runs.
    pub groups: Vec<AffinityGroup>,
}

/// Finds affinity groups by clustering graph snapshots.
pub struct AffinityGroupFinder {
    source: Arc<dyn GraphSource>,
    stats: Arc<GroupFinderStats>,
    stop_iteration: u32,
    running: AtomicBool,
    cancel: AtomicBool,
    /// Most recent partition from a succeeded or stopped run; the caller's
    /// fallback after a failed run.
    last_published: RwLock<Option<Vec<AffinityGroup>>>,
    /// The most recent terminated run; older runs survive only in the
    /// aggregate counters.
    last_run: RwLock<Option<RunRecord>>,
}

impl std::fmt::Debug for AffinityGroupFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityGroupFinder")
            .field("stop_iteration", &self.stop_iteration)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl AffinityGroupFinder {
    /// Create a finder over the given snapshot source.
    pub fn new(
        source: Arc<dyn GraphSource>,
        stats: Arc<GroupFinderStats>,
        stop_iteration: u32,
    ) -> Self {
        Self {
            source,
            stats,
            stop_iteration,
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            last_published: RwLock::new(None),
            last_run: RwLock::new(None),
        }
    }

    /// Run the clustering algorithm once, synchronously.
    ///
    /// Returns [`AffinityError::RunInProgress`] if a run is already active;
    /// rejected triggers are not queued and not counted as runs. All other
    /// outcomes, including failures, are reported through the result status.
    #[instrument(level = "debug", skip_all)]
    pub fn find_affinity_groups(&self) -> Result<FinderResult, AffinityError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AffinityError::RunInProgress);
        }
        let result = self.run_once();
        self.running.store(false, Ordering::Release);
        Ok(result)
    }

    /// The finder's statistics.
    pub fn stats(&self) -> &GroupFinderStats {
        &self.stats
    }

    /// The configured iteration bound.
    pub fn stop_iteration(&self) -> u32 {
        self.stop_iteration
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The most recently published partition, if any run has succeeded or
    /// been stopped so far.
    pub fn last_groups(&self) -> Option<Vec<AffinityGroup>> {
        self.last_published.read().clone()
    }

    /// The most recently terminated run, if any.
    pub fn last_run(&self) -> Option<RunRecord> {
        *self.last_run.read()
    }

    /// Request cooperative cancellation. An active run fails at its next
    /// pass boundary, and every subsequent run fails immediately; used on
    /// shutdown.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    fn run_once(&self) -> FinderResult {
        let started = Instant::now();
        let graph = match self.source.graph_snapshot() {
            Ok(graph) => graph,
            Err(err) => {
                warn!(error = %err, "affinity run failed taking graph snapshot");
                self.finish_run(RunRecord {
                    status: RunStatus::Failed,
                    duration: started.elapsed(),
                    iterations: 0,
                    groups: 0,
                });
                return FinderResult {
                    status: RunStatus::Failed,
                    groups: Vec::new(),
                };
            }
        };

        let (status, iterations, groups) = self.propagate(&graph);
        let duration = started.elapsed();
        self.finish_run(RunRecord {
            status,
            duration,
            iterations,
            groups: groups.len(),
        });

        match status {
            RunStatus::Succeeded | RunStatus::Stopped => {
                debug!(
                    status = %status,
                    iterations,
                    groups = groups.len(),
                    vertices = graph.vertex_count(),
                    "affinity run terminated"
                );
                *self.last_published.write() = Some(groups.clone());
                FinderResult { status, groups }
            }
            RunStatus::Failed => {
                warn!(iterations, "affinity run cancelled, partition discarded");
                FinderResult {
                    status: RunStatus::Failed,
                    groups: Vec::new(),
                }
            }
        }
    }

    fn finish_run(&self, record: RunRecord) {
        *self.last_run.write() = Some(record);
        self.stats.record_run(record);
    }

    /// Synchronous label propagation over a private snapshot.
    fn propagate(&self, graph: &AffinityGraph) -> (RunStatus, u32, Vec<AffinityGroup>) {
        let vertices: Vec<Identity> = graph.vertices().collect();
        let index: FxHashMap<Identity, usize> = vertices
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        let mut adjacency: Vec<Vec<(usize, u64)>> = vec![Vec::new(); vertices.len()];
        for (key, weight) in graph.edges() {
            let lo = index[&key.lo()];
            let hi = index[&key.hi()];
            adjacency[lo].push((hi, weight));
            adjacency[hi].push((lo, weight));
        }

        let mut labels: Vec<u64> = vertices.iter().map(|id| id.0).collect();
        let mut tallies: FxHashMap<u64, u64> = FxHashMap::default();
        let mut iterations = 0u32;

        let status = loop {
            // Cancellation is cooperative, checked at pass boundaries only.
            if self.cancel.load(Ordering::Acquire) {
                break RunStatus::Failed;
            }
            iterations += 1;

            let mut next = labels.clone();
            let mut changed = false;
            for (vertex, neighbors) in adjacency.iter().enumerate() {
                if neighbors.is_empty() {
                    continue;
                }
                tallies.clear();
                for &(neighbor, weight) in neighbors {
                    *tallies.entry(labels[neighbor]).or_insert(0) += weight;
                }
                let mut best: Option<(u64, u64)> = None;
                for (&label, &weight) in &tallies {
                    let better = match best {
                        None => true,
                        // Greatest weight wins; ties break to the smallest
                        // label, keeping runs reproducible.
                        Some((best_weight, best_label)) => {
                            weight > best_weight || (weight == best_weight && label < best_label)
                        }
                    };
                    if better {
                        best = Some((weight, label));
                    }
                }
                if let Some((_, chosen)) = best {
                    if chosen != labels[vertex] {
                        next[vertex] = chosen;
                        changed = true;
                    }
                }
            }
            labels = next;

            if !changed {
                break RunStatus::Succeeded;
            }
            if iterations >= self.stop_iteration {
                break RunStatus::Stopped;
            }
        };

        if status == RunStatus::Failed {
            return (status, iterations, Vec::new());
        }

        let mut members: BTreeMap<u64, std::collections::BTreeSet<Identity>> = BTreeMap::new();
        for (position, id) in vertices.iter().enumerate() {
            members.entry(labels[position]).or_default().insert(*id);
        }
        let groups = members
            .into_iter()
            .map(|(label, identities)| AffinityGroup::new(GroupId(label), identities))
            .collect();
        (status, iterations, groups)
    }
}
