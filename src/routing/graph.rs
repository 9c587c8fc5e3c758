use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

/// The topology over which the group communicates: nodes and undirected
///  edges, an edge meaning the two nodes can reach each other directly.
///
/// Everything is kept in ordered collections so that iteration - and with
///  it routing - is reproducible.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Graph {
    nodes: BTreeSet<Uuid>,
    edges: BTreeMap<Uuid, BTreeSet<Uuid>>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    pub fn add_node(&mut self, node: Uuid) {
        self.nodes.insert(node);
    }

    /// adds an undirected edge, implicitly adding both endpoints.
    ///  Self-loops are meaningless here and ignored.
    pub fn add_edge(&mut self, a: Uuid, b: Uuid) {
        if a == b {
            return;
        }
        self.nodes.insert(a);
        self.nodes.insert(b);
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    pub fn contains(&self, node: Uuid) -> bool {
        self.nodes.contains(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.nodes.iter().copied()
    }

    pub fn neighbors(&self, node: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.edges.get(&node)
            .into_iter()
            .flatten()
            .copied()
    }
}
