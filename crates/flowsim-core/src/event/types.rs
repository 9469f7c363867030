use petgraph::graph::NodeIndex;

use crate::constants;
use crate::network::FlowKey;
use crate::units::{Rate, Time};

/// What an event does when it is handled, together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A connection request from `issuer`. Handling time and holding time are sampled when the
    /// event is created.
    Arrival { issuer: NodeIndex },
    /// Records a successful allocation. Handled at the time it is scheduled.
    FlowAllocationSuccess { issuer: NodeIndex, flow: FlowKey },
    /// Records a blocked request. Handled at the time it is scheduled.
    FlowAllocationFailure { issuer: NodeIndex },
    /// Releases `flow` at `at`.
    EndFlow {
        issuer: NodeIndex,
        flow: FlowKey,
        at: Time,
    },
    /// Stops the run unconditionally.
    EndOfSimulation { at: Time },
    /// Replaces the arrival rate of `target`.
    ArrivalBurst {
        at: Time,
        target: NodeIndex,
        rate: Rate,
    },
    /// Snapshots the general value `value`, then again every `period` while the run lasts.
    Sample {
        at: Time,
        value: String,
        period: Time,
    },
    /// Keeps a convergence-based stop from happening before `at`.
    Watcher { at: Time },
}

impl EventKind {
    /// Name of the counter bumped each time an event of this kind is handled.
    pub fn counter_name(&self) -> &'static str {
        match self {
            EventKind::Arrival { .. } => constants::ARRIVAL,
            EventKind::FlowAllocationSuccess { .. } => constants::FLOW_ALLOCATION_SUCCESS,
            EventKind::FlowAllocationFailure { .. } => constants::FLOW_ALLOCATION_FAILURE,
            EventKind::EndFlow { .. } => constants::END_FLOW,
            EventKind::EndOfSimulation { .. } => constants::END_OF_SIMULATION,
            EventKind::ArrivalBurst { .. } => constants::ARRIVAL_BURST,
            EventKind::Sample { .. } => constants::SAMPLE,
            EventKind::Watcher { .. } => constants::WATCHER,
        }
    }

    /// The node on whose behalf the event runs, if any.
    pub fn issuer(&self) -> Option<NodeIndex> {
        match *self {
            EventKind::Arrival { issuer }
            | EventKind::FlowAllocationSuccess { issuer, .. }
            | EventKind::FlowAllocationFailure { issuer }
            | EventKind::EndFlow { issuer, .. } => Some(issuer),
            EventKind::ArrivalBurst { target, .. } => Some(target),
            EventKind::EndOfSimulation { .. }
            | EventKind::Sample { .. }
            | EventKind::Watcher { .. } => None,
        }
    }
}

/// A scheduled event. Created by the [`EventManager`](super::EventManager), owned by its queue
/// until dispatched, and dropped once handled.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub(crate) handling_time: Time,
    pub(crate) end_time: Time,
    pub(crate) kind: EventKind,
    pub(crate) user: bool,
    // Generation of the issuer's arrival process this arrival was drawn in
    pub(crate) epoch: u64,
}

impl Event {
    /// The virtual time at which the event is handled.
    pub fn handling_time(&self) -> Time {
        self.handling_time
    }

    /// When the event's effect period ends. For an arrival this is when the requested flow is
    /// released; for every other kind it equals the handling time.
    pub fn end_time(&self) -> Time {
        self.end_time
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Whether the event counts against a convergence-based stop.
    pub fn is_user(&self) -> bool {
        self.user
    }
}
