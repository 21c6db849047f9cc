//! Channel Link Graph
//!
//! Undirected graph over channel ids, independent of the tree. The
//! connected component of a channel is its audible set: audio spoken in any
//! member channel reaches listeners in all of them.

use std::collections::{BTreeSet, HashMap, VecDeque};

use vc_common::ChannelId;

/// Symmetric adjacency sets. Cycles are allowed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkGraph {
    edges: HashMap<ChannelId, BTreeSet<ChannelId>>,
}

impl LinkGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an edge list.
    pub fn from_edges(edges: impl IntoIterator<Item = (ChannelId, ChannelId)>) -> Self {
        let mut graph = Self::new();
        for (a, b) in edges {
            graph.link(a, b);
        }
        graph
    }

    /// Insert the edge `a - b`. Returns false if nothing changed.
    ///
    /// Self-links are ignored and relinking is idempotent.
    pub fn link(&mut self, a: ChannelId, b: ChannelId) -> bool {
        if a == b {
            return false;
        }
        let inserted = self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
        inserted
    }

    /// Remove the edge `a - b`. Returns false if it did not exist.
    pub fn unlink(&mut self, a: ChannelId, b: ChannelId) -> bool {
        let removed = self.detach(a, b);
        self.detach(b, a);
        removed
    }

    /// Remove every edge touching `a`. Returns the former neighbours.
    pub fn unlink_all(&mut self, a: ChannelId) -> BTreeSet<ChannelId> {
        let neighbours = self.edges.remove(&a).unwrap_or_default();
        for other in &neighbours {
            self.detach(*other, a);
        }
        neighbours
    }

    fn detach(&mut self, from: ChannelId, to: ChannelId) -> bool {
        let Some(set) = self.edges.get_mut(&from) else {
            return false;
        };
        let removed = set.remove(&to);
        if set.is_empty() {
            self.edges.remove(&from);
        }
        removed
    }

    /// Direct edge test; not transitive.
    pub fn is_linked(&self, a: ChannelId, b: ChannelId) -> bool {
        self.edges.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Direct neighbours of `c`.
    pub fn neighbours(&self, c: ChannelId) -> BTreeSet<ChannelId> {
        self.edges.get(&c).cloned().unwrap_or_default()
    }

    /// The connected component containing `c`, `c` included.
    pub fn all_links(&self, c: ChannelId) -> BTreeSet<ChannelId> {
        let mut seen = BTreeSet::from([c]);
        let mut queue = VecDeque::from([c]);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbours) = self.edges.get(&current) {
                for next in neighbours {
                    if seen.insert(*next) {
                        queue.push_back(*next);
                    }
                }
            }
        }
        seen
    }

    /// Every edge once, as `(low, high)` pairs in ascending order.
    pub fn edges(&self) -> Vec<(ChannelId, ChannelId)> {
        let mut edges: Vec<_> = self
            .edges
            .iter()
            .flat_map(|(a, set)| set.iter().filter(move |b| a < *b).map(move |b| (*a, *b)))
            .collect();
        edges.sort_unstable();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum::<usize>() / 2
    }
}
