use log::info;

use crate::config::{ConfigError, ConfigSpec, UserEvent, UserEventKind, ValidConfig};
use crate::event::{EventKind, EventManager, SimError, StopReason};
use crate::flow::FlowController;
use crate::network::Topology;
use crate::opts::SimOpts;
use crate::results::Results;

/// One simulation run: a topology wrapped in a flow controller and driven by an event manager,
/// with the user events of its configuration already scheduled.
#[derive(Debug)]
pub struct Simulation {
    manager: EventManager,
}

impl Simulation {
    /// Assembles a simulation. A fixed horizon in `opts` is scheduled as an end-of-simulation
    /// event.
    pub fn new(topology: Topology, opts: &SimOpts, events: &[UserEvent]) -> Result<Self, Error> {
        let mut schedule = Vec::with_capacity(events.len());
        for UserEvent { at, kind } in events {
            let at = *at;
            let kind = match kind {
                &UserEventKind::ArrivalBurst { target, rate } => EventKind::ArrivalBurst {
                    at,
                    target: topology
                        .idx_of(target)
                        .ok_or(ConfigError::UnknownTarget(target))?,
                    rate,
                },
                UserEventKind::Sample { value, period } => EventKind::Sample {
                    at,
                    value: value.clone(),
                    period: *period,
                },
                UserEventKind::Watcher => EventKind::Watcher { at },
            };
            schedule.push(kind);
        }

        let mut manager = EventManager::new(FlowController::new(topology), opts);
        for kind in schedule {
            manager.add_user_event(kind);
        }
        if let Some(at) = opts.end_time {
            manager.add_event(EventKind::EndOfSimulation { at });
        }
        Ok(Self { manager })
    }

    /// Assembles a simulation from a validated configuration.
    pub fn from_config(config: ValidConfig) -> Result<Self, Error> {
        let ValidConfig {
            topology,
            opts,
            events,
        } = config;
        Self::new(topology, &opts, &events)
    }

    /// Runs the simulation to completion.
    pub fn run(&mut self) -> Result<StopReason, Error> {
        let topology = self.manager.flow_controller().topology();
        info!(
            "simulating {} nodes and {} edges",
            topology.nr_nodes(),
            topology.nr_edges()
        );
        Ok(self.manager.start_event_processing()?)
    }

    pub fn manager(&self) -> &EventManager {
        &self.manager
    }

    pub fn results(&self) -> &Results {
        self.manager.results()
    }

    pub fn into_results(self) -> Results {
        self.manager.into_results()
    }
}

/// Validates a configuration and runs it once.
///
/// This function returns an error if the configuration is invalid or the run fails.
pub fn run(config: &ConfigSpec) -> Result<(StopReason, Results), Error> {
    let mut sim = Simulation::from_config(config.validate()?)?;
    let reason = sim.run()?;
    Ok((reason, sim.into_results()))
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Simulation(#[from] SimError),
}
