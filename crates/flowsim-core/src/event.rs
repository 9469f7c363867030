//! The scheduler and the events it dispatches.
//!
//! Events are a closed set of kinds ([`EventKind`]). The [`EventManager`] pops the earliest
//! pending event, advances virtual time to its handling time, applies its effect, bumps the
//! per-kind counters and runs any extra bookkeeping, then drops it. Ties in handling time are
//! broken by scheduling order.

mod manager;
mod queue;
mod types;

pub use manager::{EventManager, SimError, StopReason};
pub use types::{Event, EventKind};
