use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use rustc_hash::FxHashMap;

use crate::network::{
    routing,
    types::{Edge, EdgeError, Node, NodeId, Path},
};
use crate::random::RandomSource;

/// A link declaration. Bidirectional links become two independent edges, each with its own
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Link {
    pub a: NodeId,
    pub b: NodeId,
    pub capacity: usize,
    pub weight: f64,
    pub unidirectional: bool,
}

impl Link {
    /// A bidirectional link.
    pub fn new(a: NodeId, b: NodeId, capacity: usize, weight: f64) -> Self {
        Self {
            a,
            b,
            capacity,
            weight,
            unidirectional: false,
        }
    }

    /// A link that only carries flows from `a` to `b`.
    pub fn unidirectional(a: NodeId, b: NodeId, capacity: usize, weight: f64) -> Self {
        Self {
            unidirectional: true,
            ..Self::new(a, b, capacity, weight)
        }
    }
}

/// The network graph. Vertices carry [`Node`]s and edges carry capacity-bearing [`Edge`]s.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub(crate) graph: DiGraph<Node, Edge>,
    id2idx: FxHashMap<NodeId, NodeIndex>,
    next_number: usize,
}

impl Topology {
    /// Creates a network topology from a list of nodes and links. This function returns an error
    /// if the given description fails to produce a valid topology.
    ///
    /// Correctness properties:
    ///
    /// - Every node must have a unique ID.
    /// - Every link must have distinct endpoints in `nodes`.
    /// - For any ordered pair of nodes, there must be at most one edge between them.
    /// - Every link must have a positive capacity and a positive, finite weight.
    pub fn new(nodes: &[Node], links: &[Link]) -> Result<Self, TopologyError> {
        let mut topology = Self::default();
        for node in nodes.iter().cloned() {
            topology.add_node(node)?;
        }
        for &Link {
            a,
            b,
            capacity,
            weight,
            unidirectional,
        } in links
        {
            let edge = Edge::new(capacity, weight)
                .map_err(|source| TopologyError::InvalidEdge { a, b, source })?;
            topology.add_edge(a, b, edge.clone())?;
            if !unidirectional {
                topology.add_edge(b, a, edge)?;
            }
        }
        Ok(topology)
    }

    /// Adds a node and assigns it the next sequence number.
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeIndex, TopologyError> {
        // CORRECTNESS: Every node must have a unique ID.
        if self.id2idx.contains_key(&node.id) {
            return Err(TopologyError::DuplicateNodeId(node.id));
        }
        node.number = self.next_number;
        self.next_number += 1;
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.id2idx.insert(id, idx);
        Ok(idx)
    }

    /// Adds an edge from `src` to `dst`.
    pub fn add_edge(
        &mut self,
        src: NodeId,
        dst: NodeId,
        edge: Edge,
    ) -> Result<EdgeIndex, TopologyError> {
        // CORRECTNESS: Every link must have distinct endpoints in `nodes`.
        if src == dst {
            return Err(TopologyError::NodeAdjacentSelf(src));
        }
        let a = self.idx_of(src).ok_or(TopologyError::UndeclaredNode(src))?;
        let b = self.idx_of(dst).ok_or(TopologyError::UndeclaredNode(dst))?;
        // CORRECTNESS: For any ordered pair of nodes, there must be at most one edge.
        if self.graph.find_edge(a, b).is_some() {
            return Err(TopologyError::DuplicateLink { src, dst });
        }
        Ok(self.graph.add_edge(a, b, edge))
    }

    pub fn idx_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.id2idx.get(&id).copied()
    }

    pub fn find_edge(&self, src: NodeId, dst: NodeId) -> Option<EdgeIndex> {
        let (a, b) = (self.idx_of(src)?, self.idx_of(dst)?);
        self.graph.find_edge(a, b)
    }

    /// Returns the edges of a minimum-weight path from `src` to `dst`, using the live edge weights.
    /// The path is empty if `dst` is unreachable (or equal to `src`).
    pub fn shortest_path(&self, src: NodeIndex, dst: NodeIndex) -> Path {
        routing::shortest_path(&self.graph, src, dst)
    }

    /// Draws a node uniformly at random.
    pub fn random_node(&self, rng: &mut RandomSource) -> Option<NodeIndex> {
        match self.graph.node_count() {
            0 => None,
            n => Some(NodeIndex::new(rng.rand_int(0, n - 1))),
        }
    }

    /// Nodes with a positive arrival rate, in insertion order.
    pub fn entry_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph[idx].is_entry())
    }

    /// Sum of the weights along `path`.
    pub fn path_weight(&self, path: &[EdgeIndex]) -> f64 {
        path.iter().map(|&e| self.graph[e].weight()).sum()
    }

    pub fn nr_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn nr_edges(&self) -> usize {
        self.graph.edge_count()
    }

    delegate::delegate! {
        to self.graph {
            #[call(node_weight)]
            pub fn node(&self, idx: NodeIndex) -> Option<&Node>;

            #[call(node_weight_mut)]
            pub fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut Node>;

            #[call(edge_weight)]
            pub fn edge(&self, idx: EdgeIndex) -> Option<&Edge>;

            #[call(edge_weight_mut)]
            pub fn edge_mut(&mut self, idx: EdgeIndex) -> Option<&mut Edge>;

            pub fn edge_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)>;

            pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex>;

            pub fn edge_indices(&self) -> impl Iterator<Item = EdgeIndex>;

            #[call(node_weights)]
            pub fn nodes(&self) -> impl Iterator<Item = &Node>;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("Duplicate node ID {0}")]
    DuplicateNodeId(NodeId),

    #[error("Node {0} is connected to itself")]
    NodeAdjacentSelf(NodeId),

    #[error("Node {0} is not declared")]
    UndeclaredNode(NodeId),

    #[error("Duplicate edges from {src} to {dst}")]
    DuplicateLink { src: NodeId, dst: NodeId },

    #[error("Invalid link between {a} and {b}")]
    InvalidEdge {
        a: NodeId,
        b: NodeId,
        #[source]
        source: EdgeError,
    },
}
