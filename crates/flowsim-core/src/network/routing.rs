use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use petgraph::{
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::{EdgeRef, VisitMap, Visitable},
};
use rustc_hash::FxHashMap;

use crate::network::types::{Edge, Node, Path};

/// Single-source Dijkstra from `src`, stopped as soon as `dst` is settled. Saturated edges carry
/// an infinite weight and are never relaxed, so they cannot appear on the returned path.
pub(super) fn shortest_path(g: &DiGraph<Node, Edge>, src: NodeIndex, dst: NodeIndex) -> Path {
    if src == dst || g.node_weight(src).is_none() || g.node_weight(dst).is_none() {
        return Vec::new();
    }

    let mut settled = g.visit_map();
    let mut distances: FxHashMap<NodeIndex, f64> = [(src, 0.0)].into_iter().collect();
    // For each reached node, the edge it was reached through and that edge's source
    let mut predecessors: FxHashMap<NodeIndex, (EdgeIndex, NodeIndex)> = FxHashMap::default();

    let mut heap = BinaryHeap::new();
    heap.push(Reverse((OrderedFloat(0.0), src)));

    while let Some(Reverse((OrderedFloat(distance), n))) = heap.pop() {
        if !settled.visit(n) {
            // Stale heap entry
            continue;
        }
        if n == dst {
            break;
        }
        for e in g.edges(n) {
            let weight = e.weight().weight();
            let succ = e.target();
            if !weight.is_finite() || settled.is_visited(&succ) {
                continue;
            }
            let candidate = distance + weight;
            if distances.get(&succ).map_or(true, |&d| candidate < d) {
                distances.insert(succ, candidate);
                predecessors.insert(succ, (e.id(), n));
                heap.push(Reverse((OrderedFloat(candidate), succ)));
            }
        }
    }

    if !settled.is_visited(&dst) {
        return Vec::new();
    }

    let mut path = Vec::new();
    let mut cur = dst;
    while cur != src {
        match predecessors.get(&cur) {
            Some(&(e, prev)) => {
                path.push(e);
                cur = prev;
            }
            None => return Vec::new(),
        }
    }
    path.reverse();
    path
}
