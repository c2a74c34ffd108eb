//! # Graph Builders
//!
//! Builds the live identity-contention graph from per-task access reports.
//! Each completed unit of work contributes +1 to the edge between its owner
//! and every identity that touched at least one of the same objects within
//! the retention window, however many objects overlap.
//!
//! Contributions land in the current snapshot bucket. Pruning rotates the
//! window, recycling the oldest bucket and dropping the edges and vertices
//! it leaves behind:
//!
//! ```text
//! bucket:   [0]  [1]  [2]      snapshot_count = 3
//! update ──▶ ▲ current
//! prune  ──▶ cursor advances, oldest bucket is cleared,
//!            zero-weight edges and isolated vertices are removed
//! ```
//!
//! Both edge representations from the original experiments are supported:
//! one accumulated weight per edge, or one parallel unit-weight edge per
//! co-access. They export identical snapshots.
//!
//! Builders are safe for concurrent use: updates, reads, and pruning all
//! synchronize on a single reader-writer lock over the graph state, so each
//! logical mutation is atomic as seen by any reader and the prune rotation
//! is one bounded critical section.

use crate::config::AffinityConfig;
use crate::error::AffinityError;
use crate::finder::{AffinityGroupFinder, GraphSource};
use crate::graph::{AffinityGraph, EdgeKey};
use crate::model::{AccessDetail, Identity, ObjectId};
use crate::stats::{BuilderStatsSnapshot, GraphBuilderStats, GroupFinderStats};
use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How the builder stores co-access contributions per edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRepresentation {
    /// One accumulated weight per edge, bucketed by snapshot.
    #[default]
    Weighted,
    /// One parallel unit-weight edge per co-access, tagged with its bucket.
    Parallel,
}

/// Capability interface over deployment-specific builder variants.
///
/// Local-graph operations are a permanent topology property: variants
/// without a local graph (distributed deployments) report
/// [`has_local_graph`](GraphBuilder::has_local_graph) `== false` and return
/// [`AffinityError::UnsupportedTopology`] from all three, so callers can
/// branch once instead of treating the error as retryable.
pub trait GraphBuilder: Send + Sync {
    /// Whether this builder maintains a graph that can be mutated and read
    /// locally.
    fn has_local_graph(&self) -> bool;

    /// Fold one completed task's object accesses into the graph.
    fn update_graph(&self, owner: Identity, detail: &AccessDetail) -> Result<(), AffinityError>;

    /// Take a consistent snapshot of the current graph; empty if nothing has
    /// been recorded.
    fn affinity_graph(&self) -> Result<AffinityGraph, AffinityError>;

    /// The task that rotates the snapshot window, meant to be scheduled
    /// every `snapshot_period_ms`.
    fn prune_task(&self) -> Result<PruneTask, AffinityError>;

    /// The group finder associated with this builder, or `None` on nodes
    /// that do not run one (non-coordinator members).
    fn group_finder(&self) -> Option<Arc<AffinityGroupFinder>>;

    /// Shut down the builder: idempotent, stops any owned periodic activity
    /// and cancels in-flight finder work.
    fn shutdown(&self);
}

/// Fixed ring of per-bucket contributions for one edge or accessor entry.
#[derive(Debug, Clone)]
struct BucketRing {
    buckets: Vec<u64>,
}

impl BucketRing {
    fn new(len: usize) -> Self {
        Self {
            buckets: vec![0; len],
        }
    }

    fn add(&mut self, cursor: usize, amount: u64) {
        self.buckets[cursor] += amount;
    }

    fn clear(&mut self, cursor: usize) {
        self.buckets[cursor] = 0;
    }

    fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

/// Which identities touched each object, bucketed like the edge weights so
/// stale co-access candidates age out with the same rotation.
#[derive(Debug)]
struct ObjectAccessTracker {
    snapshot_count: usize,
    accessors: FxHashMap<ObjectId, FxHashMap<Identity, BucketRing>>,
}

impl ObjectAccessTracker {
    fn new(snapshot_count: usize) -> Self {
        Self {
            snapshot_count,
            accessors: FxHashMap::default(),
        }
    }

    /// Record one task's accesses and return the distinct identities that
    /// previously accessed any of the same objects within the window.
    fn record(
        &mut self,
        owner: Identity,
        detail: &AccessDetail,
        cursor: usize,
    ) -> FxHashSet<Identity> {
        let mut others = FxHashSet::default();
        for object in detail.objects() {
            if let Some(accessors) = self.accessors.get(&object) {
                others.extend(accessors.keys().copied().filter(|id| *id != owner));
            }
        }
        for object in detail.objects() {
            self.accessors
                .entry(object)
                .or_default()
                .entry(owner)
                .or_insert_with(|| BucketRing::new(self.snapshot_count))
                .add(cursor, 1);
        }
        others
    }

    fn rotate(&mut self, freed_bucket: usize) {
        self.accessors.retain(|_, accessors| {
            accessors.retain(|_, ring| {
                ring.clear(freed_bucket);
                ring.total() > 0
            });
            !accessors.is_empty()
        });
    }
}

/// Per-edge contribution storage for the two representations.
#[derive(Debug)]
enum EdgeStore {
    Weighted {
        snapshot_count: usize,
        edges: FxHashMap<EdgeKey, BucketRing>,
    },
    Parallel {
        /// One bucket tag per parallel unit-weight edge.
        edges: FxHashMap<EdgeKey, Vec<usize>>,
    },
}

impl EdgeStore {
    fn new(representation: EdgeRepresentation, snapshot_count: usize) -> Self {
        match representation {
            EdgeRepresentation::Weighted => Self::Weighted {
                snapshot_count,
                edges: FxHashMap::default(),
            },
            EdgeRepresentation::Parallel => Self::Parallel {
                edges: FxHashMap::default(),
            },
        }
    }

    fn add_unit(&mut self, key: EdgeKey, cursor: usize) {
        match self {
            Self::Weighted {
                snapshot_count,
                edges,
            } => edges
                .entry(key)
                .or_insert_with(|| BucketRing::new(*snapshot_count))
                .add(cursor, 1),
            Self::Parallel { edges } => edges.entry(key).or_default().push(cursor),
        }
    }

    fn rotate(&mut self, freed_bucket: usize) {
        match self {
            Self::Weighted { edges, .. } => edges.retain(|_, ring| {
                ring.clear(freed_bucket);
                ring.total() > 0
            }),
            Self::Parallel { edges } => edges.retain(|_, units| {
                units.retain(|bucket| *bucket != freed_bucket);
                !units.is_empty()
            }),
        }
    }

    fn edge_count(&self) -> usize {
        match self {
            Self::Weighted { edges, .. } => edges.len(),
            Self::Parallel { edges } => edges.len(),
        }
    }

    fn export_into(&self, graph: &mut AffinityGraph) {
        match self {
            Self::Weighted { edges, .. } => {
                for (key, ring) in edges {
                    graph.add_edge(*key, ring.total());
                }
            }
            Self::Parallel { edges } => {
                for (key, units) in edges {
                    graph.add_edge(*key, units.len() as u64);
                }
            }
        }
    }

    fn live_endpoints(&self) -> FxHashSet<Identity> {
        let mut endpoints = FxHashSet::default();
        let mut collect = |key: &EdgeKey| {
            endpoints.insert(key.lo());
            endpoints.insert(key.hi());
        };
        match self {
            Self::Weighted { edges, .. } => edges.keys().for_each(&mut collect),
            Self::Parallel { edges } => edges.keys().for_each(&mut collect),
        }
        endpoints
    }
}

/// Mutable graph state guarded by the core's lock.
#[derive(Debug)]
struct GraphState {
    /// Index of the bucket currently receiving contributions.
    cursor: usize,
    store: EdgeStore,
    tracker: ObjectAccessTracker,
    vertices: FxHashSet<Identity>,
}

/// Shared live-graph state: the builder mutates it, the finder snapshots it.
struct LocalGraphCore {
    config: AffinityConfig,
    state: RwLock<GraphState>,
    stats: Arc<GraphBuilderStats>,
}

impl LocalGraphCore {
    fn new(
        config: AffinityConfig,
        representation: EdgeRepresentation,
        stats: Arc<GraphBuilderStats>,
    ) -> Self {
        let state = GraphState {
            cursor: 0,
            store: EdgeStore::new(representation, config.snapshot_count),
            tracker: ObjectAccessTracker::new(config.snapshot_count),
            vertices: FxHashSet::default(),
        };
        Self {
            config,
            state: RwLock::new(state),
            stats,
        }
    }

    fn update(&self, owner: Identity, detail: &AccessDetail) {
        let started = Instant::now();
        {
            let mut state = self.state.write();
            let cursor = state.cursor;
            let others = state.tracker.record(owner, detail, cursor);
            state.vertices.insert(owner);
            for other in others {
                if let Some(key) = EdgeKey::new(owner, other) {
                    state.store.add_unit(key, cursor);
                    state.vertices.insert(other);
                }
            }
        }
        self.stats.record_update(started.elapsed());
    }

    fn snapshot(&self) -> AffinityGraph {
        let state = self.state.read();
        let mut graph = AffinityGraph::new();
        for vertex in &state.vertices {
            graph.add_vertex(*vertex);
        }
        state.store.export_into(&mut graph);
        graph
    }

    fn prune(&self) {
        let started = Instant::now();
        let (vertices, edges) = {
            let mut state = self.state.write();
            state.cursor = (state.cursor + 1) % self.config.snapshot_count;
            let freed = state.cursor;
            state.store.rotate(freed);
            state.tracker.rotate(freed);
            // A vertex stays live only through a positive-weight edge.
            let endpoints = state.store.live_endpoints();
            state.vertices = endpoints;
            (state.vertices.len(), state.store.edge_count())
        };
        self.stats.record_prune(started.elapsed());
        debug!(vertices, edges, "pruned affinity graph");
    }

    fn counts(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.vertices.len(), state.store.edge_count())
    }
}

impl GraphSource for LocalGraphCore {
    fn graph_snapshot(&self) -> Result<AffinityGraph, AffinityError> {
        Ok(self.snapshot())
    }
}

trait Prunable: Send + Sync {
    fn prune_once(&self);
}

impl Prunable for LocalGraphCore {
    fn prune_once(&self) {
        self.prune();
    }
}

/// Invocable window-rotation unit, scheduled externally every
/// `snapshot_period_ms` (or by the builder's owned scheduler).
#[derive(Clone)]
pub struct PruneTask {
    target: Arc<dyn Prunable>,
}

impl std::fmt::Debug for PruneTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PruneTask").finish_non_exhaustive()
    }
}

impl PruneTask {
    fn new(target: Arc<dyn Prunable>) -> Self {
        Self { target }
    }

    /// Rotate the snapshot window once.
    pub fn run(&self) {
        self.target.prune_once();
    }
}

struct PruneScheduler {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Builder that owns a local graph, one instance per node observing local
/// access events.
pub struct LocalGraphBuilder {
    core: Arc<LocalGraphCore>,
    finder: Arc<AffinityGroupFinder>,
    representation: EdgeRepresentation,
    shut_down: AtomicBool,
    scheduler: Mutex<Option<PruneScheduler>>,
}

impl std::fmt::Debug for LocalGraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGraphBuilder")
            .field("representation", &self.representation)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LocalGraphBuilder {
    /// Create a builder with one accumulated weight per edge.
    pub fn weighted(config: AffinityConfig) -> Self {
        Self::with_representation(config, EdgeRepresentation::Weighted)
    }

    /// Create a builder with parallel unit-weight edges.
    pub fn parallel(config: AffinityConfig) -> Self {
        Self::with_representation(config, EdgeRepresentation::Parallel)
    }

    /// Create a builder with the given edge representation.
    pub fn with_representation(config: AffinityConfig, representation: EdgeRepresentation) -> Self {
        let builder_stats = Arc::new(GraphBuilderStats::new(&config));
        let finder_stats = Arc::new(GroupFinderStats::new(&config));
        let core = Arc::new(LocalGraphCore::new(
            config.clone(),
            representation,
            builder_stats,
        ));
        let finder = Arc::new(AffinityGroupFinder::new(
            core.clone() as Arc<dyn GraphSource>,
            finder_stats,
            config.stop_iteration,
        ));
        Self {
            core,
            finder,
            representation,
            shut_down: AtomicBool::new(false),
            scheduler: Mutex::new(None),
        }
    }

    /// The edge representation this builder was constructed with.
    pub fn representation(&self) -> EdgeRepresentation {
        self.representation
    }

    /// The builder's static configuration.
    pub fn config(&self) -> &AffinityConfig {
        &self.core.config
    }

    /// The builder's counters and timers.
    pub fn stats(&self) -> &GraphBuilderStats {
        &self.core.stats
    }

    /// Point-in-time statistics including live graph sizes.
    pub fn stats_snapshot(&self) -> BuilderStatsSnapshot {
        let (vertices, edges) = self.core.counts();
        self.core.stats.snapshot(vertices, edges)
    }

    /// Start the owned prune scheduler, rotating the window every
    /// `snapshot_period_ms` until shutdown. No-op if already started or
    /// already shut down; deployments with an external scheduler simply
    /// never call this.
    pub fn start_prune_scheduler(&self) {
        let mut guard = self.scheduler.lock();
        if guard.is_some() || self.shut_down.load(Ordering::Acquire) {
            return;
        }
        let task = PruneTask::new(self.core.clone());
        let period = Duration::from_millis(self.core.config.snapshot_period_ms);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::spawn(move || {
            let ticker = tick(period);
            loop {
                select! {
                    recv(ticker) -> _ => task.run(),
                    recv(stop_rx) -> _ => break,
                }
            }
        });
        *guard = Some(PruneScheduler { stop_tx, handle });
        debug!(period_ms = self.core.config.snapshot_period_ms, "prune scheduler started");
    }
}

impl GraphBuilder for LocalGraphBuilder {
    fn has_local_graph(&self) -> bool {
        true
    }

    fn update_graph(&self, owner: Identity, detail: &AccessDetail) -> Result<(), AffinityError> {
        self.core.update(owner, detail);
        Ok(())
    }

    fn affinity_graph(&self) -> Result<AffinityGraph, AffinityError> {
        Ok(self.core.snapshot())
    }

    fn prune_task(&self) -> Result<PruneTask, AffinityError> {
        Ok(PruneTask::new(self.core.clone()))
    }

    fn group_finder(&self) -> Option<Arc<AffinityGroupFinder>> {
        Some(self.finder.clone())
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(scheduler) = self.scheduler.lock().take() {
            let _ = scheduler.stop_tx.send(());
            let _ = scheduler.handle.join();
        }
        self.finder.cancel();
        info!("local graph builder shut down");
    }
}

impl Drop for LocalGraphBuilder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Which part a node plays in a distributed affinity deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Runs the group finder over an aggregated graph source.
    Coordinator,
    /// Reports accesses elsewhere; runs no finder.
    Member,
}

/// Builder variant for deployments where the graph lives elsewhere.
///
/// All local-graph operations are unsupported; only the coordinator role
/// carries a finder, wired to whatever [`GraphSource`] the deployment
/// aggregates its graph through.
pub struct DistributedGraphBuilder {
    role: NodeRole,
    finder: Option<Arc<AffinityGroupFinder>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for DistributedGraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedGraphBuilder")
            .field("role", &self.role)
            .field("has_finder", &self.finder.is_some())
            .finish_non_exhaustive()
    }
}

impl DistributedGraphBuilder {
    /// Create the coordinator-side builder, running the finder over the
    /// given aggregated graph source.
    pub fn coordinator(config: &AffinityConfig, source: Arc<dyn GraphSource>) -> Self {
        let stats = Arc::new(GroupFinderStats::new(config));
        let finder = Arc::new(AffinityGroupFinder::new(
            source,
            stats,
            config.stop_iteration,
        ));
        Self {
            role: NodeRole::Coordinator,
            finder: Some(finder),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create a member-node builder: no local graph, no finder.
    pub fn member() -> Self {
        Self {
            role: NodeRole::Member,
            finder: None,
            shut_down: AtomicBool::new(false),
        }
    }

    /// This node's role.
    pub fn role(&self) -> NodeRole {
        self.role
    }
}

impl GraphBuilder for DistributedGraphBuilder {
    fn has_local_graph(&self) -> bool {
        false
    }

    fn update_graph(&self, _owner: Identity, _detail: &AccessDetail) -> Result<(), AffinityError> {
        Err(AffinityError::UnsupportedTopology)
    }

    fn affinity_graph(&self) -> Result<AffinityGraph, AffinityError> {
        Err(AffinityError::UnsupportedTopology)
    }

    fn prune_task(&self) -> Result<PruneTask, AffinityError> {
        Err(AffinityError::UnsupportedTopology)
    }

    fn group_finder(&self) -> Option<Arc<AffinityGroupFinder>> {
        self.finder.clone()
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(finder) = &self.finder {
            finder.cancel();
        }
        info!(role = ?self.role, "distributed graph builder shut down");
    }
}
