//! Names of the values the simulation records in its [`Results`](crate::Results).

/// Per-kind dispatch counters.
pub const ARRIVAL: &str = "Arrival";
pub const FLOW_ALLOCATION_SUCCESS: &str = "Flow_allocation_success";
pub const FLOW_ALLOCATION_FAILURE: &str = "Flow_allocation_failure";
pub const END_FLOW: &str = "End_flow";
pub const END_OF_SIMULATION: &str = "End_of_simulation";
pub const ARRIVAL_BURST: &str = "Arrival_burst";
pub const SAMPLE: &str = "Sample";
pub const WATCHER: &str = "Watcher";

/// Failed over attempted allocations. This is the value the run converges on.
pub const BLOCKING_RATE: &str = "Blocking_rate";

/// Mean number of edges held by successfully allocated flows.
pub const MEAN_FLOW_LENGTH: &str = "Mean_flow_length";

/// Mean of the per-node blocking rates.
pub const MEAN_NODE_BLOCKING_RATE: &str = "Mean_node_blocking_rate";

/// Handling time of the last dispatched event.
pub const VIRTUAL_TIME: &str = "Virtual_time";

pub const DISPATCHED_EVENTS: &str = "Dispatched_events";

pub const MEAN_INTER_EVENT_TIME: &str = "Mean_inter_event_time";
