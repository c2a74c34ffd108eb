//! # Affinity Graph
//!
//! The read-side snapshot of the identity-contention graph: identities as
//! vertices, undirected weighted edges for task-level co-accesses. Snapshots
//! are immutable and independent of the live graph, so readers and the group
//! finder never contend with ongoing updates.

use crate::model::Identity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Normalized unordered pair of distinct identities.
///
/// The lower ordinal is always stored first, so `(a, b)` and `(b, a)` map to
/// the same edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    lo: Identity,
    hi: Identity,
}

impl EdgeKey {
    /// Create a normalized edge key, or `None` for a self-edge.
    pub fn new(a: Identity, b: Identity) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { lo: a, hi: b }),
            std::cmp::Ordering::Greater => Some(Self { lo: b, hi: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The endpoint with the lower ordinal.
    pub fn lo(&self) -> Identity {
        self.lo
    }

    /// The endpoint with the higher ordinal.
    pub fn hi(&self) -> Identity {
        self.hi
    }

    /// The endpoint opposite `id`, or `None` if `id` is not an endpoint.
    pub fn other(&self, id: Identity) -> Option<Identity> {
        if id == self.lo {
            Some(self.hi)
        } else if id == self.hi {
            Some(self.lo)
        } else {
            None
        }
    }
}

/// Immutable snapshot of the weighted identity-contention graph.
///
/// Zero-weight edges and isolated vertices do not exist in a snapshot, with
/// one exception: a vertex whose accesses were recorded but which has not yet
/// co-accessed anything appears without edges until the next prune removes it.
/// Vertices and edges iterate in ascending identity order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityGraph {
    vertices: BTreeSet<Identity>,
    edges: BTreeMap<EdgeKey, u64>,
}

impl AffinityGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex without any incident edge.
    pub fn add_vertex(&mut self, id: Identity) {
        self.vertices.insert(id);
    }

    /// Add an edge with the given positive weight, inserting both endpoints.
    /// A zero weight is ignored.
    pub fn add_edge(&mut self, key: EdgeKey, weight: u64) {
        if weight == 0 {
            return;
        }
        self.vertices.insert(key.lo);
        self.vertices.insert(key.hi);
        *self.edges.entry(key).or_insert(0) += weight;
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges with positive weight.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Sum of all edge weights.
    pub fn total_weight(&self) -> u64 {
        self.edges.values().sum()
    }

    /// Whether the identity is a vertex of this graph.
    pub fn contains_vertex(&self, id: Identity) -> bool {
        self.vertices.contains(&id)
    }

    /// Weight of the edge between two identities; 0 if absent.
    pub fn weight(&self, a: Identity, b: Identity) -> u64 {
        EdgeKey::new(a, b)
            .and_then(|key| self.edges.get(&key).copied())
            .unwrap_or(0)
    }

    /// Number of vertices this identity shares at least one edge with.
    pub fn degree(&self, id: Identity) -> usize {
        self.edges.keys().filter(|key| key.other(id).is_some()).count()
    }

    /// Iterate vertices in ascending ordinal order.
    pub fn vertices(&self) -> impl Iterator<Item = Identity> + '_ {
        self.vertices.iter().copied()
    }

    /// Iterate edges as `(key, weight)` in ascending key order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, u64)> + '_ {
        self.edges.iter().map(|(key, weight)| (*key, *weight))
    }

    /// Neighbors of an identity with the connecting edge weight.
    pub fn neighbors(&self, id: Identity) -> impl Iterator<Item = (Identity, u64)> + '_ {
        self.edges
            .iter()
            .filter_map(move |(key, weight)| key.other(id).map(|other| (other, *weight)))
    }

    /// Export the graph to DOT format for visualization.
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        dot.push_str("graph AffinityGraph {\n");
        dot.push_str("  node [shape=circle, style=filled, fillcolor=lightblue];\n");
        for vertex in &self.vertices {
            let _ = writeln!(dot, "  \"{vertex}\";");
        }
        for (key, weight) in &self.edges {
            let _ = writeln!(
                dot,
                "  \"{}\" -- \"{}\" [label=\"{}\", weight={}];",
                key.lo, key.hi, weight, weight
            );
        }
        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_key_normalizes() {
        let forward = EdgeKey::new(Identity(2), Identity(5)).unwrap();
        let backward = EdgeKey::new(Identity(5), Identity(2)).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.lo(), Identity(2));
        assert_eq!(forward.hi(), Identity(5));
    }

    #[test]
    fn test_edge_key_rejects_self_edge() {
        assert!(EdgeKey::new(Identity(3), Identity(3)).is_none());
    }

    #[test]
    fn test_edge_key_other() {
        let key = EdgeKey::new(Identity(1), Identity(4)).unwrap();
        assert_eq!(key.other(Identity(1)), Some(Identity(4)));
        assert_eq!(key.other(Identity(4)), Some(Identity(1)));
        assert_eq!(key.other(Identity(9)), None);
    }

    #[test]
    fn test_weight_is_symmetric() {
        let mut graph = AffinityGraph::new();
        graph.add_edge(EdgeKey::new(Identity(1), Identity(2)).unwrap(), 3);
        assert_eq!(graph.weight(Identity(1), Identity(2)), 3);
        assert_eq!(graph.weight(Identity(2), Identity(1)), 3);
        assert_eq!(graph.weight(Identity(1), Identity(3)), 0);
    }

    #[test]
    fn test_zero_weight_edge_is_ignored() {
        let mut graph = AffinityGraph::new();
        graph.add_edge(EdgeKey::new(Identity(1), Identity(2)).unwrap(), 0);
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_degree_and_neighbors() {
        let mut graph = AffinityGraph::new();
        graph.add_edge(EdgeKey::new(Identity(1), Identity(2)).unwrap(), 1);
        graph.add_edge(EdgeKey::new(Identity(1), Identity(3)).unwrap(), 2);
        graph.add_vertex(Identity(9));

        assert_eq!(graph.degree(Identity(1)), 2);
        assert_eq!(graph.degree(Identity(9)), 0);
        let neighbors: Vec<_> = graph.neighbors(Identity(1)).collect();
        assert_eq!(neighbors, vec![(Identity(2), 1), (Identity(3), 2)]);
    }

    #[test]
    fn test_dot_export_lists_vertices_and_edges() {
        let mut graph = AffinityGraph::new();
        graph.add_edge(EdgeKey::new(Identity(1), Identity(2)).unwrap(), 4);
        let dot = graph.to_dot();
        assert!(dot.contains("\"I1\" -- \"I2\""));
        assert!(dot.contains("label=\"4\""));
    }
}
