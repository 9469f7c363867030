use log::{debug, info, trace, warn};
use petgraph::graph::NodeIndex;
use rustc_hash::FxHashMap;

use crate::constants;
use crate::event::queue::EventQueue;
use crate::event::types::{Event, EventKind};
use crate::flow::{FlowController, FlowError, KeyGenerator};
use crate::network::NodeId;
use crate::opts::SimOpts;
use crate::random::RandomSource;
use crate::results::{Holder, MetricKind, ResultError, Results};
use crate::units::{Rate, Time};

/// Why [`EventManager::start_event_processing`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StopReason {
    /// The blocking rate settled and no user event was pending.
    Converged,
    /// An end-of-simulation event was handled.
    EndOfSimulation,
    /// Nothing was left to handle.
    QueueDrained,
    /// The configured number of events was dispatched.
    MaxEvents,
}

/// The scheduler. It owns the pending events, the virtual clock, the flow controller, the
/// results and the random stream, and is the only thing that mutates any of them.
#[derive(Debug)]
pub struct EventManager {
    queue: EventQueue,
    now: Time,
    eos: bool,
    user_events: usize,
    results: Results,
    flow_controller: FlowController,
    rng: RandomSource,
    check_interval: u64,
    nr_samples: usize,
    epsilon: f64,
    max_events: Option<u64>,
    // Arrivals queued under an older epoch of their issuer are stale
    epochs: FxHashMap<NodeIndex, u64>,
}

impl EventManager {
    pub fn new(flow_controller: FlowController, opts: &SimOpts) -> Self {
        Self {
            queue: EventQueue::default(),
            now: Time::ZERO,
            eos: false,
            user_events: 0,
            results: Results::new(),
            flow_controller,
            rng: RandomSource::new(opts.seed),
            check_interval: opts.check_interval.max(1),
            nr_samples: opts.nr_samples,
            epsilon: opts.epsilon,
            max_events: opts.max_events,
            epochs: FxHashMap::default(),
        }
    }

    /// Creates an event of the given kind and enqueues it. Arrivals sample their delay and
    /// holding time here, so creation consumes randomness. Events that would never be handled
    /// (an arrival at a node with rate zero) are dropped.
    pub fn add_event(&mut self, kind: EventKind) {
        self.enqueue(kind, false);
    }

    /// Like [`add_event`](Self::add_event), but the event holds off a convergence-based stop
    /// until it has been handled.
    pub fn add_user_event(&mut self, kind: EventKind) {
        self.enqueue(kind, true);
    }

    fn enqueue(&mut self, kind: EventKind, user: bool) {
        let (handling_time, end_time) = match &kind {
            EventKind::Arrival { issuer } => match self.flow_controller.topology().node(*issuer) {
                Some(node) => {
                    let (arrival_rate, service_rate) = (node.arrival_rate(), node.service_rate());
                    let handling_time = self.now + self.rng.next_arrival(arrival_rate);
                    let end_time = handling_time + self.rng.rand_duration(service_rate);
                    (handling_time, end_time)
                }
                None => (Time::INFINITY, Time::INFINITY),
            },
            EventKind::FlowAllocationSuccess { .. } | EventKind::FlowAllocationFailure { .. } => {
                (self.now, self.now)
            }
            EventKind::EndFlow { at, .. }
            | EventKind::EndOfSimulation { at }
            | EventKind::ArrivalBurst { at, .. }
            | EventKind::Sample { at, .. }
            | EventKind::Watcher { at } => (*at, *at),
        };
        if !handling_time.is_finite() {
            warn!("dropping {kind:?}: handling time is {handling_time}");
            return;
        }
        let epoch = match &kind {
            EventKind::Arrival { issuer } => self.epoch(*issuer),
            _ => 0,
        };
        if user {
            self.new_user_event();
        }
        self.queue.push(Event {
            handling_time,
            end_time,
            kind,
            user,
            epoch,
        });
    }

    fn epoch(&self, node: NodeIndex) -> u64 {
        self.epochs.get(&node).copied().unwrap_or_default()
    }

    fn is_stale(&self, event: &Event) -> bool {
        match event.kind {
            EventKind::Arrival { issuer } => event.epoch != self.epoch(issuer),
            _ => false,
        }
    }

    /// Runs the simulation until it is told to stop, converges, or runs out of events.
    ///
    /// Before the loop, one arrival is seeded per entry node and the blocking rate is registered
    /// along with its convergence sampler. Every `check_interval` dispatches the blocking rate is
    /// sampled; the run stops once the sampler has settled and no user event is pending. Handling
    /// a user event restarts the interval, so the stop always rests on a check taken after the
    /// last one.
    pub fn start_event_processing(&mut self) -> Result<StopReason, SimError> {
        let entries = self.flow_controller.topology().entry_nodes().collect::<Vec<_>>();
        for issuer in entries {
            self.add_event(EventKind::Arrival { issuer });
        }
        self.register_metrics()?;
        info!(
            "starting event processing with {} pending events",
            self.queue.len()
        );

        let mut dispatched = 0_u64;
        let mut since_check = 0_u64;
        let mut converged = false;
        let reason = loop {
            if self.eos {
                break StopReason::EndOfSimulation;
            }
            if matches!(self.max_events, Some(max) if dispatched >= max) {
                break StopReason::MaxEvents;
            }
            if converged && self.user_events == 0 {
                break StopReason::Converged;
            }
            let Some(event) = self.queue.pop() else {
                break StopReason::QueueDrained;
            };
            if self.is_stale(&event) {
                trace!("{}: dropping superseded {:?}", event.handling_time, event.kind);
                if event.user {
                    self.handled_user_event();
                }
                continue;
            }
            let user = event.user;
            self.dispatch(event)?;
            dispatched += 1;
            if user {
                converged = false;
                since_check = 0;
                continue;
            }
            since_check += 1;
            if since_check == self.check_interval {
                since_check = 0;
                converged = self.results.check_convergence(constants::BLOCKING_RATE)?;
                debug!(
                    "{}: blocking rate {} after {dispatched} events (converged: {converged})",
                    self.now,
                    self.results.get(Holder::General, constants::BLOCKING_RATE),
                );
            }
        };
        info!("stopped at {} after {dispatched} events: {reason:?}", self.now);
        Ok(reason)
    }

    fn register_metrics(&mut self) -> Result<(), ResultError> {
        self.results.add_computed_value(
            true,
            constants::BLOCKING_RATE,
            MetricKind::Ratio {
                numerator: constants::FLOW_ALLOCATION_FAILURE.to_owned(),
                denominator: constants::ARRIVAL.to_owned(),
            },
            true,
        )?;
        self.results.add_computed_value(
            false,
            constants::MEAN_NODE_BLOCKING_RATE,
            MetricKind::HolderMean {
                value: constants::BLOCKING_RATE.to_owned(),
            },
            true,
        )?;
        self.results.add_computed_value(
            true,
            constants::MEAN_FLOW_LENGTH,
            MetricKind::IncrementalMean {
                counter: constants::FLOW_ALLOCATION_SUCCESS.to_owned(),
            },
            false,
        )?;
        self.results.add_computed_value(
            false,
            constants::MEAN_INTER_EVENT_TIME,
            MetricKind::IncrementalMean {
                counter: constants::DISPATCHED_EVENTS.to_owned(),
            },
            false,
        )?;
        self.results
            .register_convergence(constants::BLOCKING_RATE, self.epsilon, self.nr_samples);
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SimError> {
        trace!("{}: {:?}", event.handling_time, event.kind);
        let elapsed = event.handling_time - self.now;
        self.now = event.handling_time;
        self.record_elapsed(elapsed)?;

        self.handle_event(&event)?;
        self.automated_update_result(&event);
        self.post_handle(&event)?;

        if event.user {
            self.handled_user_event();
        }
        Ok(())
    }

    fn record_elapsed(&mut self, elapsed: Time) -> Result<(), ResultError> {
        let results = &mut self.results;
        results.record_value(constants::VIRTUAL_TIME, Holder::General, self.now.into_f64());
        results.increase_value(constants::DISPATCHED_EVENTS, Holder::General, 1.0);
        results.update_computed_value(
            constants::MEAN_INTER_EVENT_TIME,
            Holder::General,
            elapsed.into_f64(),
        )?;
        Ok(())
    }

    fn handle_event(&mut self, event: &Event) -> Result<(), SimError> {
        match &event.kind {
            &EventKind::Arrival { issuer } => {
                // The arrival process of a node never stops on its own
                self.add_event(EventKind::Arrival { issuer });
                let exit = self.get_random_exit_node(issuer)?;
                let flow = self.flow_controller.allocate_flow(issuer, exit);
                if KeyGenerator::is_valid_key(flow) {
                    // Success must come out of the queue before the flow is released
                    self.add_event(EventKind::FlowAllocationSuccess { issuer, flow });
                    self.add_event(EventKind::EndFlow {
                        issuer,
                        flow,
                        at: event.end_time,
                    });
                } else {
                    debug!("{}: flow from {issuer:?} to {exit:?} blocked", self.now);
                    self.add_event(EventKind::FlowAllocationFailure { issuer });
                }
            }
            EventKind::FlowAllocationSuccess { .. } | EventKind::FlowAllocationFailure { .. } => {}
            &EventKind::EndFlow { flow, .. } => self.flow_controller.free_flow(flow)?,
            EventKind::EndOfSimulation { .. } => self.set_eos(),
            &EventKind::ArrivalBurst { target, rate, .. } => self.burst(target, rate),
            EventKind::Sample { value, period, .. } => {
                self.results.record_snapshot(value, self.now);
                // A lone sample would otherwise keep an idle simulation alive forever
                if period.is_finite() && *period > Time::ZERO && !self.queue.is_empty() {
                    self.add_event(EventKind::Sample {
                        at: self.now + *period,
                        value: value.clone(),
                        period: *period,
                    });
                }
            }
            EventKind::Watcher { .. } => {}
        }
        Ok(())
    }

    fn burst(&mut self, target: NodeIndex, rate: Rate) {
        let Some(node) = self.flow_controller.topology_mut().node_mut(target) else {
            warn!("arrival burst on unknown node {target:?}");
            return;
        };
        let old = node.swap_arrival_rate(rate);
        debug!("{}: arrival rate of node {} {old} -> {rate}", self.now, node.id);
        // Arrivals are memoryless, so redrawing the pending one at the new rate is exact
        *self.epochs.entry(target).or_default() += 1;
        self.add_event(EventKind::Arrival { issuer: target });
    }

    /// Bumps the per-kind counter under the general holder and the issuing node.
    fn automated_update_result(&mut self, event: &Event) {
        let name = event.kind.counter_name();
        self.results.increase_value(name, Holder::General, 1.0);
        if let Some(id) = self.issuer_id(&event.kind) {
            self.results.increase_value(name, Holder::Node(id), 1.0);
        }
    }

    fn post_handle(&mut self, event: &Event) -> Result<(), SimError> {
        if let &EventKind::FlowAllocationSuccess { flow, .. } = &event.kind {
            let length = self
                .flow_controller
                .get_flow(flow)
                .ok_or(FlowError::NotRegistered(flow))?
                .length() as f64;
            self.results
                .update_computed_value(constants::MEAN_FLOW_LENGTH, Holder::General, length)?;
            if let Some(id) = self.issuer_id(&event.kind) {
                self.results
                    .update_computed_value(constants::MEAN_FLOW_LENGTH, Holder::Node(id), length)?;
            }
        }
        Ok(())
    }

    fn issuer_id(&self, kind: &EventKind) -> Option<NodeId> {
        let idx = kind.issuer()?;
        self.flow_controller.topology().node(idx).map(|n| n.id)
    }

    /// Draws a node other than `exclude`, uniformly at random. The draw is made over the other
    /// nodes only, so it never has to be repeated; a topology without any other node is an error.
    pub fn get_random_exit_node(&mut self, exclude: NodeIndex) -> Result<NodeIndex, SimError> {
        let n = self.flow_controller.topology().nr_nodes();
        if n < 2 || exclude.index() >= n {
            return Err(SimError::LoopDetected { node: exclude });
        }
        let draw = self.rng.rand_int(0, n - 2);
        let idx = if draw >= exclude.index() { draw + 1 } else { draw };
        Ok(NodeIndex::new(idx))
    }

    pub fn new_user_event(&mut self) {
        self.user_events += 1;
    }

    pub fn handled_user_event(&mut self) {
        debug_assert!(self.user_events > 0, "no user event outstanding");
        self.user_events = self.user_events.saturating_sub(1);
    }

    pub fn user_events(&self) -> usize {
        self.user_events
    }

    /// Stops the run after the current event.
    pub fn set_eos(&mut self) {
        self.eos = true;
    }

    /// The current virtual time.
    pub fn now(&self) -> Time {
        self.now
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut Results {
        &mut self.results
    }

    pub fn flow_controller(&self) -> &FlowController {
        &self.flow_controller
    }

    pub fn flow_controller_mut(&mut self) -> &mut FlowController {
        &mut self.flow_controller
    }

    pub fn nr_pending(&self) -> usize {
        self.queue.len()
    }

    pub fn into_results(self) -> Results {
        self.results
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("no exit node distinct from {node:?}")]
    LoopDetected { node: NodeIndex },

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}
