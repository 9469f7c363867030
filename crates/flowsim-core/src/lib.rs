#![warn(unreachable_pub, missing_debug_implementations)]

//! The core flowsim library. This crate defines [the simulation](Simulation) of a flow-switched
//! network: nodes request flows at random, flows are routed over capacity-bearing edges and
//! released after a random holding time, and the run stops once the blocking rate converges.

#[macro_use]
mod ident;

pub mod config;
pub mod constants;
pub mod event;
pub mod flow;
pub mod network;
pub mod opts;
pub mod random;
pub mod results;
pub mod simulation;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AttrMap, ConfigError, ConfigSpec, UserEvent, UserEventKind, ValidConfig};
pub use event::{EventKind, EventManager, SimError, StopReason};
pub use flow::{Flow, FlowController, FlowError, KeyGenerator};
pub use network::{
    Edge, EdgeError, FlowKey, Link, Node, NodeError, NodeId, Topology, TopologyError,
};
pub use opts::SimOpts;
pub use random::RandomSource;
pub use results::{Holder, MetricKind, ResultError, Results, Sampler};
pub use simulation::{run, Error, Simulation};
pub use units::{Rate, Time};
