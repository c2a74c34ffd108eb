//! # affinity-rs
//!
//! Partition-affinity subsystem for a horizontally scaled application
//! server. Worker threads report, once per completed unit of work, which
//! shared objects an identity touched; the graph builder folds those reports
//! into a time-windowed weighted contention graph, and the affinity group
//! finder periodically clusters a snapshot of that graph into groups of
//! identities that should be co-located on the same node.
//!
//! The node-assignment/migration machinery, the object store, and metric
//! export are external collaborators: this crate produces the graph, the
//! groups, and read-only counters, nothing more. Nothing is persisted across
//! restarts.
//!
//! ```
//! use affinity_rs::{
//!     AccessDetail, AffinityConfig, GraphBuilder, Identity, LocalGraphBuilder, ObjectId,
//! };
//!
//! let builder = LocalGraphBuilder::weighted(AffinityConfig::default());
//! let detail: AccessDetail = [ObjectId(7), ObjectId(8)].into_iter().collect();
//! builder.update_graph(Identity(1), &detail).unwrap();
//!
//! let finder = builder.group_finder().unwrap();
//! let result = finder.find_affinity_groups().unwrap();
//! println!("{} groups ({})", result.groups.len(), result.status);
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod finder;
pub mod graph;
pub mod model;
pub mod stats;
pub mod test_support;

// Re-export main types for convenience
pub use builder::{
    DistributedGraphBuilder, EdgeRepresentation, GraphBuilder, LocalGraphBuilder, NodeRole,
    PruneTask,
};
pub use config::{AffinityConfig, ConfigError};
pub use error::AffinityError;
pub use finder::{AffinityGroupFinder, FinderResult, GraphSource};
pub use graph::{AffinityGraph, EdgeKey};
pub use model::{AccessDetail, AffinityGroup, GroupId, Identity, ObjectId, RunStatus};
pub use stats::{
    BuilderStatsSnapshot, FinderStatsSnapshot, GraphBuilderStats, GroupFinderStats, RunRecord,
};
