use petgraph::graph::EdgeIndex;

use crate::units::Rate;

identifier!(NodeId, usize);
identifier!(FlowKey, u64);

/// A traffic source and sink. Nodes generate connection requests at `arrival_rate` and hold the
/// resulting flows for a duration drawn with `service_rate`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Node {
    /// The stable identity the node was declared with.
    pub id: NodeId,
    pub(crate) number: usize,
    name: String,
    arrival_rate: Rate,
    service_rate: Rate,
}

impl Node {
    /// Creates a node. Fails if either rate is negative or not finite.
    pub fn new(
        id: NodeId,
        arrival_rate: impl Into<Rate>,
        service_rate: impl Into<Rate>,
    ) -> Result<Self, NodeError> {
        let (arrival_rate, service_rate) = (arrival_rate.into(), service_rate.into());
        if !arrival_rate.is_valid() {
            return Err(NodeError::InvalidArrivalRate(arrival_rate));
        }
        if !service_rate.is_valid() {
            return Err(NodeError::InvalidServiceRate(service_rate));
        }
        Ok(Self {
            id,
            number: 0,
            name: format!("node-{id}"),
            arrival_rate,
            service_rate,
        })
    }

    /// Replaces the default display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The sequence number assigned when the node was added to a topology.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arrival_rate(&self) -> Rate {
        self.arrival_rate
    }

    pub fn service_rate(&self) -> Rate {
        self.service_rate
    }

    /// Nodes with a positive arrival rate originate flows.
    pub fn is_entry(&self) -> bool {
        self.arrival_rate > Rate::ZERO
    }

    /// Installs a new arrival rate and returns the previous one.
    pub fn swap_arrival_rate(&mut self, rate: Rate) -> Rate {
        debug_assert!(rate.is_valid(), "swapping to invalid arrival rate {rate}");
        std::mem::replace(&mut self.arrival_rate, rate)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    #[error("invalid arrival rate {0}")]
    InvalidArrivalRate(Rate),

    #[error("invalid service rate {0}")]
    InvalidServiceRate(Rate),
}

/// A unidirectional link with a fixed number of flow slots.
///
/// The routing weight is finite while at least one slot is free and infinite once the edge is
/// saturated. The flip happens only on the transitions between zero and one free slot, so the
/// configured weight is stashed in `backup_weight` while the edge is full.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Edge {
    max_flows: usize,
    available_flows: usize,
    weight: f64,
    backup_weight: f64,
    flows: Vec<FlowKey>,
}

impl Edge {
    pub fn new(capacity: usize, weight: f64) -> Result<Self, EdgeError> {
        if capacity == 0 {
            return Err(EdgeError::ZeroCapacity);
        }
        if !(weight.is_finite() && weight > 0.0) {
            return Err(EdgeError::InvalidWeight(weight));
        }
        Ok(Self {
            max_flows: capacity,
            available_flows: capacity,
            weight,
            backup_weight: f64::INFINITY,
            flows: Vec::new(),
        })
    }

    /// Reserves one slot for `flow` and returns the number of slots left.
    pub fn allocate_flow(&mut self, flow: FlowKey) -> Result<usize, EdgeError> {
        if self.available_flows == 0 {
            return Err(EdgeError::Exhausted);
        }
        self.flows.push(flow);
        if self.available_flows == 1 {
            self.switch_weight();
        }
        self.available_flows -= 1;
        Ok(self.available_flows)
    }

    /// Releases the slot held by `flow`.
    pub fn free_flow(&mut self, flow: FlowKey) {
        debug_assert!(
            self.available_flows < self.max_flows,
            "freeing flow {flow} on an edge with no allocation"
        );
        if self.available_flows == 0 {
            self.switch_weight();
        }
        if let Some(pos) = self.flows.iter().position(|&f| f == flow) {
            self.flows.remove(pos);
        }
        self.available_flows += 1;
    }

    fn switch_weight(&mut self) {
        if self.weight.is_infinite() {
            self.weight = self.backup_weight;
            self.backup_weight = f64::INFINITY;
        } else {
            self.backup_weight = self.weight;
            self.weight = f64::INFINITY;
        }
    }

    /// The live routing weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn max_flows(&self) -> usize {
        self.max_flows
    }

    pub fn available_flows(&self) -> usize {
        self.available_flows
    }

    pub fn is_saturated(&self) -> bool {
        self.available_flows == 0
    }

    /// Keys of the flows currently holding a slot, in allocation order.
    pub fn flow_keys(&self) -> impl Iterator<Item = FlowKey> + '_ {
        self.flows.iter().copied()
    }

    /// An edge whose slot count and weight disagree, as if a reservation had raced the router.
    #[cfg(test)]
    pub(crate) fn exhausted_with_finite_weight(capacity: usize, weight: f64) -> Self {
        Self {
            max_flows: capacity,
            available_flows: 0,
            weight,
            backup_weight: f64::INFINITY,
            flows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EdgeError {
    #[error("edge capacity must be at least 1")]
    ZeroCapacity,

    #[error("edge weight must be positive and finite (got {0})")]
    InvalidWeight(f64),

    #[error("no flow slot available on edge")]
    Exhausted,
}

/// An ordered sequence of edges between two nodes.
pub type Path = Vec<EdgeIndex>;
