//! Core flowsim data structures and routines. The most common entry point is
//! [Simulation](simulation::Simulation), which runs a [configuration](config::ConfigSpec) until
//! its blocking rate converges.

pub use flowsim_core::*;
