//! This module defines the [`SimOpts`] configuration which describes when a simulation stops and
//! how it draws random numbers.

use crate::units::Time;

/// Simulation options.
#[derive(Debug, Clone, PartialEq, typed_builder::TypedBuilder, serde::Serialize)]
pub struct SimOpts {
    /// Number of dispatched events between two convergence checks.
    #[builder(default = 1000)]
    pub check_interval: u64,
    /// Size of the convergence window.
    #[builder(default = 6)]
    pub nr_samples: usize,
    /// The blocking rate has converged once the standard deviation of the window drops below
    /// this.
    #[builder(default = 0.03)]
    pub epsilon: f64,
    /// Seed of the random stream.
    #[builder(default)]
    pub seed: u64,
    /// Fixed horizon. The run stops at this time even if it has not converged.
    #[builder(default, setter(strip_option))]
    pub end_time: Option<Time>,
    /// Stops the run once this many events have been dispatched.
    #[builder(default, setter(strip_option))]
    pub max_events: Option<u64>,
}

impl Default for SimOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SimOpts {
    /// Returns a copy of these options with a different seed.
    pub fn with_seed(&self, seed: u64) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }
}
