//! The physical layer: nodes, capacity-bearing edges, and the topology graph that routes flows
//! over them.

mod routing;
pub mod topology;
pub mod types;

pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use topology::{Link, Topology, TopologyError};
pub use types::*;
