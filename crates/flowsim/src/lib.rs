//! `flowsim` is a discrete-event simulator of flow-switched networks. Nodes request connections
//! at random, each connection is routed along the current shortest path and holds one slot on
//! every edge of it for a random duration, and requests that find no path are blocked. A run
//! stops once the measured blocking rate has converged.

#![warn(unreachable_pub, missing_docs)]

pub mod core;
pub mod utils;
