//! # Data Model
//!
//! Core identifiers and result types for the affinity subsystem.
//! Identities and objects are opaque handles minted by the session layer and
//! the object store; this crate only compares, orders, and hashes them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Compact identifier for an identity (a connected session or game entity).
///
/// The inner value is the identity ordinal, used for deterministic ordering
/// and for label tie-breaks during clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub u64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Compact identifier for a shared object in the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Identifier for an affinity group within one finder run.
///
/// The value is the winning label of the group, i.e. the ordinal of the
/// lowest identity whose label survived propagation, so ids are stable for a
/// given input graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// The set of objects one completed unit of work accessed.
///
/// Reported once per task by the access-log collaborator; duplicate accesses
/// within a task collapse to a single membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDetail {
    objects: BTreeSet<ObjectId>,
}

impl AccessDetail {
    /// Create an empty access detail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accessed object.
    pub fn record(&mut self, object: ObjectId) {
        self.objects.insert(object);
    }

    /// Iterate the accessed objects in ascending order.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.iter().copied()
    }

    /// Whether the given object was accessed.
    pub fn contains(&self, object: ObjectId) -> bool {
        self.objects.contains(&object)
    }

    /// Number of distinct objects accessed.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no objects were accessed.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl FromIterator<ObjectId> for AccessDetail {
    fn from_iter<T: IntoIterator<Item = ObjectId>>(iter: T) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<ObjectId>> for AccessDetail {
    fn from(objects: Vec<ObjectId>) -> Self {
        objects.into_iter().collect()
    }
}

/// Terminal status of one affinity group finder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run converged: a full pass changed no labels.
    Succeeded,
    /// The run hit an unrecoverable condition; its partition was discarded.
    Failed,
    /// The run hit the iteration bound before converging. The partition it
    /// returned is still valid and usable.
    Stopped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// A set of identities judged to frequently access common objects.
///
/// The groups produced by one finder run partition that run's input vertex
/// set: every vertex belongs to exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityGroup {
    /// Group identifier, stable for a given input graph.
    pub id: GroupId,
    /// Member identities, in ascending ordinal order.
    pub identities: BTreeSet<Identity>,
}

impl AffinityGroup {
    /// Create a group from its winning label and members.
    pub fn new(id: GroupId, identities: BTreeSet<Identity>) -> Self {
        Self { id, identities }
    }

    /// Whether the identity belongs to this group.
    pub fn contains(&self, identity: Identity) -> bool {
        self.identities.contains(&identity)
    }

    /// Number of member identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ordering_and_display() {
        assert!(Identity(1) < Identity(2));
        assert_eq!(Identity(7).to_string(), "I7");
        assert_eq!(ObjectId(3).to_string(), "O3");
        assert_eq!(GroupId(0).to_string(), "G0");
    }

    #[test]
    fn test_access_detail_deduplicates() {
        let mut detail = AccessDetail::new();
        detail.record(ObjectId(1));
        detail.record(ObjectId(1));
        detail.record(ObjectId(2));
        assert_eq!(detail.len(), 2);
        assert!(detail.contains(ObjectId(1)));
        assert!(!detail.contains(ObjectId(3)));
    }

    #[test]
    fn test_access_detail_from_vec() {
        let detail = AccessDetail::from(vec![ObjectId(5), ObjectId(4), ObjectId(5)]);
        let objects: Vec<_> = detail.objects().collect();
        assert_eq!(objects, vec![ObjectId(4), ObjectId(5)]);
    }

    #[test]
    fn test_group_membership() {
        let group =
            AffinityGroup::new(GroupId(1), [Identity(1), Identity(3)].into_iter().collect());
        assert_eq!(group.len(), 2);
        assert!(group.contains(Identity(3)));
        assert!(!group.contains(Identity(2)));
    }
}
