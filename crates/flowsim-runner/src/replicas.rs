//! This module runs independent replicas of one configuration in parallel, one seed per replica.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use flowsim_core::{Results, Simulation, StopReason, ValidConfig};
use log::{info, warn};
use rayon::prelude::*;

/// The outcome of one replica.
#[derive(Debug, serde::Serialize)]
pub(crate) struct Report {
    pub(crate) seed: u64,
    pub(crate) reason: StopReason,
    pub(crate) results: Results,
}

/// Runs one replica per seed. Replicas not yet started when `running` is cleared are skipped.
/// Reports come back sorted by seed.
pub(crate) fn run_replicas(
    config: &ValidConfig,
    seeds: Vec<u64>,
    running: &AtomicBool,
) -> anyhow::Result<Vec<Report>> {
    let (s, r) = crossbeam_channel::unbounded();
    seeds
        .into_par_iter()
        .try_for_each_with(s, |s, seed| {
            if !running.load(Ordering::SeqCst) {
                warn!("skipping replica with seed {seed}");
                return Ok(());
            }
            let report = run_one(config, seed)?;
            // The receiver outlives every sender
            let _ = s.send(report);
            Ok::<_, anyhow::Error>(())
        })?;
    let mut reports = r.iter().collect::<Vec<_>>();
    reports.sort_by_key(|r| r.seed);
    Ok(reports)
}

fn run_one(config: &ValidConfig, seed: u64) -> anyhow::Result<Report> {
    let opts = config.opts.with_seed(seed);
    let mut sim = Simulation::new(config.topology.clone(), &opts, &config.events)
        .with_context(|| format!("failed to set up replica {seed}"))?;
    let reason = sim
        .run()
        .with_context(|| format!("replica {seed} failed"))?;
    info!("replica {seed} stopped at {}: {reason:?}", sim.manager().now());
    Ok(Report {
        seed,
        reason,
        results: sim.into_results(),
    })
}
