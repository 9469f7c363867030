//! Flows and the controller that reserves capacity for them.

use log::{debug, warn};
use petgraph::graph::{EdgeIndex, NodeIndex};
use rustc_hash::FxHashMap;

use crate::network::{FlowKey, Path, Topology};

/// One allocated connection, represented by the edges it holds a slot on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    path: Path,
}

impl Flow {
    pub fn new(path: Path) -> Self {
        Self { path }
    }

    pub fn edges(&self) -> &[EdgeIndex] {
        &self.path
    }

    /// Number of edges on the path.
    pub fn length(&self) -> usize {
        self.path.len()
    }
}

/// Hands out unique flow keys. [`FlowKey::ZERO`] is reserved to mean "no flow" and is never
/// returned by [`KeyGenerator::next`].
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    counter: u64,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(FlowKey::ZERO)
    }
}

impl KeyGenerator {
    /// The first key produced is `seed + 1`.
    pub fn new(seed: FlowKey) -> Self {
        Self {
            counter: seed.inner(),
        }
    }

    pub fn next(&mut self) -> FlowKey {
        self.counter = self.counter.wrapping_add(1);
        if self.counter == FlowKey::ZERO.inner() {
            self.counter = 1;
        }
        FlowKey::new(self.counter)
    }

    pub fn no_key() -> FlowKey {
        FlowKey::ZERO
    }

    pub fn is_valid_key(key: FlowKey) -> bool {
        key != Self::no_key()
    }
}

/// Allocates flows over a topology. Allocation is all-or-nothing: either every edge on the path
/// holds a slot tagged with the flow's key, or none does and the flow table is unchanged.
#[derive(Debug)]
pub struct FlowController {
    topology: Topology,
    flows: FxHashMap<FlowKey, Flow>,
    keys: KeyGenerator,
}

impl FlowController {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            flows: FxHashMap::default(),
            keys: KeyGenerator::default(),
        }
    }

    /// Routes a flow from `src` to `dst` along the current shortest path and reserves one slot on
    /// every edge of it. Returns [`KeyGenerator::no_key`] if there is no path or a reservation
    /// fails; in that case nothing is left allocated.
    pub fn allocate_flow(&mut self, src: NodeIndex, dst: NodeIndex) -> FlowKey {
        let key = self.keys.next();
        let path = self.topology.shortest_path(src, dst);
        if path.is_empty() {
            debug!("no path from {src:?} to {dst:?}");
            return KeyGenerator::no_key();
        }
        if self.flows.contains_key(&key) {
            warn!("flow key {key} is already registered");
            return KeyGenerator::no_key();
        }
        self.flows.insert(key, Flow::new(path.clone()));

        for (i, &e) in path.iter().enumerate() {
            let reserved = match self.topology.edge_mut(e) {
                Some(edge) => edge.allocate_flow(key).is_ok(),
                None => false,
            };
            if !reserved {
                debug!("reservation failed on {e:?} for flow {key}, rolling back");
                self.release(key, &path[..i]);
                self.flows.remove(&key);
                return KeyGenerator::no_key();
            }
        }
        key
    }

    /// Releases every slot held by the flow and forgets it.
    pub fn free_flow(&mut self, key: FlowKey) -> Result<(), FlowError> {
        let flow = self
            .flows
            .remove(&key)
            .ok_or(FlowError::NotRegistered(key))?;
        self.release(key, flow.edges());
        Ok(())
    }

    fn release(&mut self, key: FlowKey, edges: &[EdgeIndex]) {
        for &e in edges {
            if let Some(edge) = self.topology.edge_mut(e) {
                edge.free_flow(key);
            }
        }
    }

    pub fn get_flow(&self, key: FlowKey) -> Option<&Flow> {
        self.flows.get(&key)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    delegate::delegate! {
        to self.flows {
            #[call(len)]
            pub fn nr_flows(&self) -> usize;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("flow {0} is not registered")]
    NotRegistered(FlowKey),
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;
    use crate::network::{Edge, NodeId};
    use crate::testing;

    fn controller(config: (Vec<crate::network::Node>, Vec<crate::network::Link>)) -> FlowController {
        let (nodes, links) = config;
        FlowController::new(Topology::new(&nodes, &links).unwrap())
    }

    fn idx(fc: &FlowController, i: usize) -> NodeIndex {
        fc.topology().idx_of(NodeId::new(i)).unwrap()
    }

    fn snapshot(fc: &FlowController) -> Vec<(usize, f64)> {
        fc.topology()
            .edge_indices()
            .map(|e| {
                let edge = fc.topology().edge(e).unwrap();
                (edge.available_flows(), edge.weight())
            })
            .collect()
    }

    #[test]
    fn key_generator_skips_sentinel() {
        let mut keys = KeyGenerator::default();
        assert_eq!(keys.next(), FlowKey::new(1));
        assert_eq!(keys.next(), FlowKey::new(2));
        let mut keys = KeyGenerator::new(FlowKey::new(u64::MAX - 1));
        assert_eq!(keys.next(), FlowKey::new(u64::MAX));
        assert_eq!(keys.next(), FlowKey::new(1));
        assert!(!KeyGenerator::is_valid_key(KeyGenerator::no_key()));
        assert!(KeyGenerator::is_valid_key(FlowKey::new(42)));
    }

    #[test]
    fn flow_length_counts_edges() {
        let flow = Flow::new(vec![EdgeIndex::new(4), EdgeIndex::new(1)]);
        assert_eq!(flow.length(), 2);
        assert_eq!(flow.edges(), &[EdgeIndex::new(4), EdgeIndex::new(1)]);
    }

    #[test]
    fn allocate_then_free_restores_edges() -> anyhow::Result<()> {
        let mut fc = controller(testing::diamond_config());
        let before = snapshot(&fc);
        let key = fc.allocate_flow(idx(&fc, 0), idx(&fc, 3));
        assert!(KeyGenerator::is_valid_key(key));
        assert_eq!(fc.get_flow(key).map(Flow::length), Some(3));
        for &e in fc.get_flow(key).unwrap().edges() {
            let edge = fc.topology().edge(e).unwrap();
            assert_eq!(edge.flow_keys().collect::<Vec<_>>(), vec![key]);
        }
        assert_ne!(snapshot(&fc), before);
        fc.free_flow(key).context("failed to free flow")?;
        assert_eq!(snapshot(&fc), before);
        assert_eq!(fc.nr_flows(), 0);
        Ok(())
    }

    #[test]
    fn no_path_returns_sentinel_without_side_effects() {
        let mut fc = controller(testing::two_node_config());
        let (a, b) = (idx(&fc, 0), idx(&fc, 1));
        assert!(KeyGenerator::is_valid_key(fc.allocate_flow(a, b)));
        let nr_flows = fc.nr_flows();
        let before = snapshot(&fc);
        assert!(fc.topology().shortest_path(a, b).is_empty());
        assert_eq!(fc.allocate_flow(a, b), KeyGenerator::no_key());
        assert_eq!(fc.nr_flows(), nr_flows);
        assert_eq!(snapshot(&fc), before);
    }

    #[test]
    fn single_slot_link_blocks_then_recovers() -> anyhow::Result<()> {
        let mut fc = controller(testing::two_node_config());
        let (a, b) = (idx(&fc, 0), idx(&fc, 1));
        let first = fc.allocate_flow(a, b);
        assert!(KeyGenerator::is_valid_key(first));
        assert_eq!(fc.allocate_flow(a, b), KeyGenerator::no_key());
        fc.free_flow(first)?;
        let again = fc.allocate_flow(a, b);
        assert!(KeyGenerator::is_valid_key(again));
        assert_ne!(again, first);
        Ok(())
    }

    #[test]
    fn free_unknown_flow_fails() {
        let mut fc = controller(testing::two_node_config());
        assert_eq!(
            fc.free_flow(FlowKey::new(9)),
            Err(FlowError::NotRegistered(FlowKey::new(9)))
        );
    }

    #[test]
    fn double_free_fails() -> anyhow::Result<()> {
        let mut fc = controller(testing::diamond_config());
        let key = fc.allocate_flow(idx(&fc, 0), idx(&fc, 3));
        fc.free_flow(key)?;
        assert!(fc.free_flow(key).is_err());
        Ok(())
    }

    #[test]
    fn failed_reservation_rolls_back() {
        let mut fc = controller(testing::diamond_config());
        let (src, dst) = (idx(&fc, 0), idx(&fc, 3));
        let path = fc.topology().shortest_path(src, dst);
        assert_eq!(path.len(), 3);
        // The last edge reports no free slot but still advertises a finite weight, so the route
        // goes through it and the reservation on it fails after the first two succeeded.
        let last = *path.last().unwrap();
        let weight = fc.topology().edge(last).unwrap().weight();
        *fc.topology_mut().edge_mut(last).unwrap() = Edge::exhausted_with_finite_weight(1, weight);
        let before = snapshot(&fc);
        assert_eq!(fc.allocate_flow(src, dst), KeyGenerator::no_key());
        assert_eq!(fc.nr_flows(), 0);
        assert_eq!(snapshot(&fc), before);
        for &e in &path {
            assert_eq!(fc.topology().edge(e).unwrap().flow_keys().count(), 0);
        }
    }
}
