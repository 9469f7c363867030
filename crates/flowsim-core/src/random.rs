//! The single random stream of a simulation. Every draw goes through one [`RandomSource`], so a
//! fixed seed reproduces a run exactly.

use rand::prelude::*;
use rand_distr::Exp;

use crate::units::{Rate, Time};

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Delay until the next arrival of a Poisson process with the given rate. A zero rate never
    /// fires and yields an infinite delay.
    pub fn next_arrival(&mut self, rate: Rate) -> Time {
        self.exponential(rate)
    }

    /// Holding time of a flow served at the given rate.
    pub fn rand_duration(&mut self, rate: Rate) -> Time {
        self.exponential(rate)
    }

    /// Uniform integer in `lo..=hi`.
    pub fn rand_int(&mut self, lo: usize, hi: usize) -> usize {
        debug_assert!(lo <= hi);
        self.rng.gen_range(lo..=hi)
    }

    fn exponential(&mut self, rate: Rate) -> Time {
        debug_assert!(rate.is_valid(), "invalid rate {rate}");
        if rate == Rate::ZERO {
            return Time::INFINITY;
        }
        match Exp::new(rate.into_f64()) {
            Ok(exp) => Time::new(exp.sample(&mut self.rng)),
            Err(_) => Time::INFINITY,
        }
    }
}
