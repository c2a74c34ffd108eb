//! Library error type.
//!
//! "Stopped" runs are not errors; they are reported through
//! [`RunStatus`](crate::model::RunStatus) on the run result. Errors here are
//! reserved for permanent capability facts and rejected triggers.

use thiserror::Error;

/// Errors surfaced by the affinity subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AffinityError {
    /// The operation requires a local affinity graph, which this builder
    /// topology does not provide. A permanent property of the deployment,
    /// not a transient failure; callers should check
    /// [`has_local_graph`](crate::builder::GraphBuilder::has_local_graph)
    /// once instead of retrying.
    #[error("builder topology has no local affinity graph")]
    UnsupportedTopology,

    /// An affinity group run is already in progress. Triggers are never
    /// queued; retry after the active run terminates.
    #[error("an affinity group finder run is already in progress")]
    RunInProgress,

    /// The graph snapshot backing a finder run could not be produced.
    #[error("graph snapshot unavailable: {0}")]
    SnapshotUnavailable(String),
}
