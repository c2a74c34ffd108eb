//! Seeded workload generation and finder stubs for tests and benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AffinityError;
use crate::finder::GraphSource;
use crate::graph::AffinityGraph;
use crate::model::{AccessDetail, Identity, ObjectId};

/// One generated task: the owner and the objects it accessed.
pub type Task = (Identity, AccessDetail);

/// A reproducible stream of task access reports.
#[derive(Debug, Clone)]
pub struct GeneratedWorkload {
    pub tasks: Vec<Task>,
}

/// Generate a workload of `task_count` tasks over `identity_count`
/// identities and `object_count` objects.
///
/// With probability `locality`, a task draws its objects from its owner's
/// home block of objects (identities sharing a block form natural affinity
/// groups); otherwise objects are drawn uniformly.
pub fn generate_workload(
    identity_count: u64,
    object_count: u64,
    task_count: usize,
    locality: f64,
    seed: u64,
) -> GeneratedWorkload {
    let mut rng = StdRng::seed_from_u64(seed);
    let block_size = (object_count / identity_count).max(1);
    let mut tasks = Vec::with_capacity(task_count);

    for _ in 0..task_count {
        let owner = Identity(rng.random_range(0..identity_count));
        let objects_per_task = rng.random_range(1..=4u64);
        let mut detail = AccessDetail::new();
        for _ in 0..objects_per_task {
            let object = if rng.random_bool(locality) {
                let home = (owner.0 * block_size) % object_count;
                ObjectId(home + rng.random_range(0..block_size))
            } else {
                ObjectId(rng.random_range(0..object_count))
            };
            detail.record(object);
        }
        tasks.push((owner, detail));
    }

    GeneratedWorkload { tasks }
}

/// Tasks that turn each listed identity set into a clique: every member
/// repeatedly accesses one object shared by its clique only.
pub fn clique_workload(cliques: &[&[u64]]) -> Vec<Task> {
    let mut tasks = Vec::new();
    for (clique_index, members) in cliques.iter().enumerate() {
        let shared = ObjectId(1_000_000 + clique_index as u64);
        // Two rounds so every pair co-occurs at least once in both directions.
        for _ in 0..2 {
            for member in *members {
                let detail: AccessDetail = [shared].into_iter().collect();
                tasks.push((Identity(*member), detail));
            }
        }
    }
    tasks
}

/// Graph source that always returns the same snapshot.
#[derive(Debug, Clone)]
pub struct FixedGraphSource {
    graph: AffinityGraph,
}

impl FixedGraphSource {
    pub fn new(graph: AffinityGraph) -> Self {
        Self { graph }
    }
}

impl GraphSource for FixedGraphSource {
    fn graph_snapshot(&self) -> Result<AffinityGraph, AffinityError> {
        Ok(self.graph.clone())
    }
}

/// Graph source that always fails, as a remote aggregation outage would.
#[derive(Debug, Clone, Copy)]
pub struct FailingGraphSource;

impl GraphSource for FailingGraphSource {
    fn graph_snapshot(&self) -> Result<AffinityGraph, AffinityError> {
        Err(AffinityError::SnapshotUnavailable(
            "remote graph data unavailable".to_string(),
        ))
    }
}
