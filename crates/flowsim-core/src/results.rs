//! Counters, derived metrics and convergence tracking.
//!
//! Values live in a two-level map: a [`Holder`] (a node, or the [general](Holder::General)
//! holder for network-wide values) maps value names to numbers. Missing entries read as zero.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rustc_hash::FxHashMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::network::NodeId;
use crate::units::Time;

/// The entity a value is recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Holder {
    /// Network-wide values.
    General,
    Node(NodeId),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::General => write!(f, "general"),
            Holder::Node(id) => write!(f, "{id}"),
        }
    }
}

impl From<NodeId> for Holder {
    fn from(id: NodeId) -> Self {
        Holder::Node(id)
    }
}

/// How a computed value is derived from other values of the same holder.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    /// `numerator / denominator`. A missing numerator counts as zero; a missing or zero
    /// denominator yields NaN.
    Ratio {
        numerator: String,
        denominator: String,
    },
    /// Running mean whose sample count is the value named `counter`. Updated in O(1) as
    /// `(mean * (n - 1) + x) / n`, which accumulates rounding error over long runs.
    IncrementalMean { counter: String },
    /// Mean of `value` over every node holder, skipping holders where it is not finite.
    HolderMean { value: String },
}

#[derive(Debug, Clone)]
struct ComputedValue {
    per_holder: bool,
    kind: MetricKind,
    recompute_on_read: bool,
}

/// A fixed window of the most recent samples of one value.
///
/// Unfilled slots hold NaN, so the standard deviation is not finite (and the value cannot be
/// reported as converged) until the window has been filled once.
#[derive(Debug, Clone)]
pub struct Sampler {
    samples: Vec<f64>,
    cursor: usize,
    epsilon: f64,
}

impl Sampler {
    pub fn new(window: usize, epsilon: f64) -> Self {
        debug_assert!(window > 0, "empty convergence window");
        debug_assert!(epsilon > 0.0, "non-positive epsilon {epsilon}");
        Self {
            samples: vec![f64::NAN; window.max(1)],
            cursor: 0,
            epsilon,
        }
    }

    pub fn push(&mut self, sample: f64) {
        self.samples[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.samples.len();
    }

    /// Population standard deviation of the window, computed in two passes.
    pub fn std_dev(&self) -> f64 {
        let n = self.samples.len() as f64;
        let mean = self.samples.iter().sum::<f64>() / n;
        let var = self.samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        var.sqrt()
    }

    pub fn has_converged(&self) -> bool {
        self.std_dev() < self.epsilon
    }
}

/// The result store of one simulation.
#[derive(Debug, Clone, Default)]
pub struct Results {
    values: BTreeMap<Holder, BTreeMap<String, f64>>,
    computed: FxHashMap<String, ComputedValue>,
    samplers: FxHashMap<String, Sampler>,
    snapshots: FxHashMap<String, Vec<(Time, f64)>>,
}

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to a value, starting from zero.
    pub fn increase_value(&mut self, name: &str, holder: Holder, delta: f64) {
        *self.slot(holder, name) += delta;
    }

    /// Overwrites a value.
    pub fn record_value(&mut self, name: &str, holder: Holder, value: f64) {
        *self.slot(holder, name) = value;
    }

    /// Registers a derived value. A per-holder value is seeded for every holder seen so far,
    /// otherwise it is seeded once under the general holder.
    pub fn add_computed_value(
        &mut self,
        per_holder: bool,
        name: &str,
        kind: MetricKind,
        recompute_on_read: bool,
    ) -> Result<(), ResultError> {
        if recompute_on_read && matches!(kind, MetricKind::IncrementalMean { .. }) {
            // Re-evaluating on read would feed the mean a spurious sample
            return Err(ResultError::RecomputedMean(name.to_owned()));
        }
        if let MetricKind::HolderMean { value } = &kind {
            // CORRECTNESS: An aggregate cannot be defined over itself or another aggregate.
            let nested = value == name
                || matches!(
                    self.computed.get(value.as_str()),
                    Some(ComputedValue {
                        kind: MetricKind::HolderMean { .. },
                        ..
                    })
                );
            if nested {
                return Err(ResultError::NestedAggregate(name.to_owned()));
            }
        }
        self.computed.insert(
            name.to_owned(),
            ComputedValue {
                per_holder,
                kind,
                recompute_on_read,
            },
        );
        let holders = if per_holder {
            let mut holders = self.values.keys().copied().collect::<Vec<_>>();
            if holders.is_empty() {
                holders.push(Holder::General);
            }
            holders
        } else {
            vec![Holder::General]
        };
        for holder in holders {
            self.update_computed_value(name, holder, 0.0)?;
        }
        Ok(())
    }

    /// Re-evaluates a derived value for `holder`, feeding `sample` to kinds that take one, and
    /// stores the result.
    pub fn update_computed_value(
        &mut self,
        name: &str,
        holder: Holder,
        sample: f64,
    ) -> Result<f64, ResultError> {
        let computed = self
            .computed
            .get(name)
            .ok_or_else(|| ResultError::NotRegistered(name.to_owned()))?;
        let value = self.evaluate(holder, name, &computed.kind, sample);
        self.record_value(name, holder, value);
        Ok(value)
    }

    /// Reads a value. Derived values flagged recompute-on-read are refreshed and stored first.
    pub fn get(&mut self, holder: Holder, name: &str) -> f64 {
        let value = self.fresh(holder, name);
        if self.is_recomputed(name) {
            self.record_value(name, holder, value);
        }
        value
    }

    /// The stored value, if any, without refreshing it.
    pub fn peek(&self, holder: Holder, name: &str) -> Option<f64> {
        self.values.get(&holder)?.get(name).copied()
    }

    pub fn register_convergence(&mut self, name: &str, epsilon: f64, window: usize) {
        self.samplers
            .insert(name.to_owned(), Sampler::new(window, epsilon));
    }

    /// Feeds the current general value of `name` to its sampler and reports whether the window
    /// has settled.
    pub fn check_convergence(&mut self, name: &str) -> Result<bool, ResultError> {
        if !self.samplers.contains_key(name) {
            return Err(ResultError::NotRegistered(name.to_owned()));
        }
        let sample = self.get(Holder::General, name);
        let sampler = self
            .samplers
            .get_mut(name)
            .ok_or_else(|| ResultError::NotRegistered(name.to_owned()))?;
        sampler.push(sample);
        Ok(sampler.has_converged())
    }

    /// Appends the current general value of `name`, tagged with `time`, to its snapshot series.
    pub fn record_snapshot(&mut self, name: &str, time: Time) {
        let value = self.get(Holder::General, name);
        self.snapshots
            .entry(name.to_owned())
            .or_default()
            .push((time, value));
    }

    /// Recorded snapshots of `name` in recording order, skipping non-finite values.
    pub fn snapshots(&self, name: &str) -> impl Iterator<Item = (Time, f64)> + '_ {
        self.snapshots
            .get(name)
            .into_iter()
            .flatten()
            .copied()
            .filter(|(_, v)| v.is_finite())
    }

    pub fn holders(&self) -> impl Iterator<Item = Holder> + '_ {
        self.values.keys().copied()
    }

    fn slot(&mut self, holder: Holder, name: &str) -> &mut f64 {
        self.values
            .entry(holder)
            .or_default()
            .entry(name.to_owned())
            .or_insert(0.0)
    }

    fn is_recomputed(&self, name: &str) -> bool {
        self.computed
            .get(name)
            .map_or(false, |c| c.recompute_on_read)
    }

    /// The value as [`get`](Self::get) would return it, without storing anything.
    fn fresh(&self, holder: Holder, name: &str) -> f64 {
        match self.computed.get(name) {
            Some(c) if c.recompute_on_read => self.evaluate(holder, name, &c.kind, 0.0),
            _ => self.peek(holder, name).unwrap_or(0.0),
        }
    }

    fn evaluate(&self, holder: Holder, name: &str, kind: &MetricKind, sample: f64) -> f64 {
        match kind {
            MetricKind::Ratio {
                numerator,
                denominator,
            } => match self.peek(holder, denominator) {
                Some(d) if d != 0.0 => self.peek(holder, numerator).unwrap_or(0.0) / d,
                _ => f64::NAN,
            },
            MetricKind::IncrementalMean { counter } => match self.peek(holder, counter) {
                Some(n) if n > 0.0 => {
                    let mean = self.peek(holder, name).unwrap_or(0.0);
                    (mean * (n - 1.0) + sample) / n
                }
                _ => sample,
            },
            MetricKind::HolderMean { value } => {
                let (sum, count) = self
                    .values
                    .keys()
                    .filter(|h| matches!(h, Holder::Node(_)))
                    .map(|&h| self.fresh(h, value))
                    .filter(|v| v.is_finite())
                    .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            }
        }
    }

    /// Value names shown for `holder`: everything stored, plus derived values that are
    /// recomputed on read and apply to it.
    fn names_of(&self, holder: Holder) -> BTreeSet<&str> {
        let mut names = self
            .values
            .get(&holder)
            .into_iter()
            .flat_map(|values| values.keys().map(String::as_str))
            .collect::<BTreeSet<_>>();
        names.extend(
            self.computed
                .iter()
                .filter(|(_, c)| c.recompute_on_read && (c.per_holder || holder == Holder::General))
                .map(|(name, _)| name.as_str()),
        );
        names
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for holder in self.holders() {
            writeln!(f, "Holder {holder}")?;
            for name in self.names_of(holder) {
                writeln!(f, "\t{name:<40} {}", self.fresh(holder, name))?;
            }
        }
        Ok(())
    }
}

struct HolderValues<'a> {
    results: &'a Results,
    holder: Holder,
}

impl Serialize for HolderValues<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.results.names_of(self.holder);
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for name in names {
            map.serialize_entry(name, &self.results.fresh(self.holder, name))?;
        }
        map.end()
    }
}

impl Serialize for Results {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for holder in self.holders() {
            map.serialize_entry(
                &holder.to_string(),
                &HolderValues {
                    results: self,
                    holder,
                },
            )?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultError {
    #[error("value {0} is not registered")]
    NotRegistered(String),

    #[error("aggregate {0} is defined over an aggregate")]
    NestedAggregate(String),

    #[error("incremental mean {0} cannot be recomputed on read")]
    RecomputedMean(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(i: usize) -> Holder {
        Holder::Node(NodeId::new(i))
    }

    fn ratio(numerator: &str, denominator: &str) -> MetricKind {
        MetricKind::Ratio {
            numerator: numerator.to_owned(),
            denominator: denominator.to_owned(),
        }
    }

    #[test]
    fn missing_values_read_as_zero() {
        let mut results = Results::new();
        assert_eq!(results.get(Holder::General, "nothing"), 0.0);
        assert_eq!(results.peek(Holder::General, "nothing"), None);
        results.increase_value("counter", node(1), 1.0);
        results.increase_value("counter", node(1), 2.5);
        results.record_value("level", Holder::General, 7.0);
        assert_eq!(results.get(node(1), "counter"), 3.5);
        assert_eq!(results.get(Holder::General, "level"), 7.0);
    }

    #[test]
    fn ratio_handles_missing_operands() -> anyhow::Result<()> {
        let mut results = Results::new();
        results.add_computed_value(false, "rate", ratio("fail", "try"), true)?;
        assert!(results.get(Holder::General, "rate").is_nan());
        results.increase_value("try", Holder::General, 4.0);
        assert_eq!(results.get(Holder::General, "rate"), 0.0);
        results.increase_value("fail", Holder::General, 1.0);
        assert_eq!(results.get(Holder::General, "rate"), 0.25);
        results.record_value("try", Holder::General, 0.0);
        assert!(results.get(Holder::General, "rate").is_nan());
        Ok(())
    }

    #[test]
    fn stored_value_is_stale_without_recompute() -> anyhow::Result<()> {
        let mut results = Results::new();
        results.increase_value("try", Holder::General, 2.0);
        results.add_computed_value(false, "rate", ratio("try", "try"), false)?;
        results.increase_value("try", Holder::General, 2.0);
        assert_eq!(results.get(Holder::General, "rate"), 1.0);
        results.record_value("rate", Holder::General, 0.5);
        assert_eq!(results.get(Holder::General, "rate"), 0.5);
        Ok(())
    }

    #[test]
    fn incremental_mean_tracks_samples() -> anyhow::Result<()> {
        let mut results = Results::new();
        results.add_computed_value(
            true,
            "mean",
            MetricKind::IncrementalMean {
                counter: "n".to_owned(),
            },
            false,
        )?;
        for x in [2.0, 4.0, 9.0] {
            results.increase_value("n", node(0), 1.0);
            results.update_computed_value("mean", node(0), x)?;
        }
        assert_eq!(results.get(node(0), "mean"), 5.0);
        Ok(())
    }

    #[test]
    fn holder_mean_skips_general_and_nan() -> anyhow::Result<()> {
        let mut results = Results::new();
        results.add_computed_value(true, "rate", ratio("fail", "try"), true)?;
        results.add_computed_value(
            false,
            "mean_rate",
            MetricKind::HolderMean {
                value: "rate".to_owned(),
            },
            true,
        )?;
        results.increase_value("try", node(0), 2.0);
        results.increase_value("fail", node(0), 1.0);
        results.increase_value("try", node(1), 4.0);
        // Node 2 never tried, its rate is NaN
        results.increase_value("fail", node(2), 0.0);
        results.increase_value("try", Holder::General, 100.0);
        assert_eq!(results.get(Holder::General, "mean_rate"), 0.25);
        Ok(())
    }

    #[test]
    fn nested_aggregate_is_rejected() -> anyhow::Result<()> {
        let mut results = Results::new();
        let mean = |value: &str| MetricKind::HolderMean {
            value: value.to_owned(),
        };
        assert_eq!(
            results.add_computed_value(false, "m", mean("m"), true),
            Err(ResultError::NestedAggregate("m".to_owned()))
        );
        results.add_computed_value(false, "m1", mean("x"), true)?;
        assert!(results.add_computed_value(false, "m2", mean("m1"), true).is_err());
        Ok(())
    }

    #[test]
    fn recomputed_incremental_mean_is_rejected() -> anyhow::Result<()> {
        let mut results = Results::new();
        let mean = || MetricKind::IncrementalMean {
            counter: "n".to_owned(),
        };
        assert_eq!(
            results.add_computed_value(false, "avg", mean(), true),
            Err(ResultError::RecomputedMean("avg".to_owned()))
        );
        assert_eq!(results.peek(Holder::General, "avg"), None);
        results.add_computed_value(false, "avg", mean(), false)?;
        results.increase_value("n", Holder::General, 1.0);
        results.update_computed_value("avg", Holder::General, 4.0)?;
        // Plain reads leave the mean alone
        assert_eq!(results.get(Holder::General, "avg"), 4.0);
        assert_eq!(results.get(Holder::General, "avg"), 4.0);
        Ok(())
    }

    #[test]
    fn update_unregistered_fails() {
        let mut results = Results::new();
        assert_eq!(
            results.update_computed_value("ghost", Holder::General, 1.0),
            Err(ResultError::NotRegistered("ghost".to_owned()))
        );
    }

    #[test]
    fn identical_samples_converge() {
        for epsilon in [1e-9, 0.03, 10.0] {
            let mut sampler = Sampler::new(6, epsilon);
            for _ in 0..5 {
                sampler.push(0.42);
                assert!(!sampler.has_converged(), "converged before window filled");
            }
            sampler.push(0.42);
            assert!(sampler.has_converged());
        }
    }

    #[test]
    fn spread_samples_do_not_converge() {
        let mut sampler = Sampler::new(6, 0.03);
        for i in 0..60 {
            sampler.push(i as f64);
            assert!(!sampler.has_converged());
        }
    }

    #[test]
    fn window_forgets_old_samples() {
        let mut sampler = Sampler::new(3, 0.03);
        for x in [100.0, -100.0, 1.0, 1.0, 1.0] {
            sampler.push(x);
        }
        assert!(sampler.has_converged());
    }

    #[test]
    fn check_convergence_requires_registration() -> anyhow::Result<()> {
        let mut results = Results::new();
        assert_eq!(
            results.check_convergence("x"),
            Err(ResultError::NotRegistered("x".to_owned()))
        );
        results.record_value("x", Holder::General, 3.0);
        results.register_convergence("x", 0.03, 2);
        assert!(!results.check_convergence("x")?);
        assert!(results.check_convergence("x")?);
        Ok(())
    }

    #[test]
    fn snapshots_skip_non_finite_values() -> anyhow::Result<()> {
        let mut results = Results::new();
        results.add_computed_value(false, "rate", ratio("fail", "try"), true)?;
        results.record_snapshot("rate", Time::new(1.0));
        results.increase_value("try", Holder::General, 2.0);
        results.record_snapshot("rate", Time::new(2.0));
        results.increase_value("fail", Holder::General, 1.0);
        results.record_snapshot("rate", Time::new(3.0));
        let snaps = results.snapshots("rate").collect::<Vec<_>>();
        assert_eq!(snaps, vec![(Time::new(2.0), 0.0), (Time::new(3.0), 0.5)]);
        assert_eq!(results.snapshots("unknown").count(), 0);
        Ok(())
    }

    #[test]
    fn display_lists_holders_in_order() -> anyhow::Result<()> {
        let mut results = Results::new();
        results.increase_value("Arrival", node(1), 2.0);
        results.increase_value("Arrival", Holder::General, 2.0);
        results.increase_value("Flow_allocation_failure", Holder::General, 1.0);
        results.add_computed_value(
            false,
            "Blocking_rate",
            ratio("Flow_allocation_failure", "Arrival"),
            true,
        )?;
        let dump = results.to_string();
        assert!(dump.lines().filter(|l| !l.starts_with("Holder")).all(|l| l.starts_with('\t')));
        let lines = dump.lines().map(str::trim).collect::<Vec<_>>();
        insta::assert_yaml_snapshot!(lines, @r###"
        ---
        - Holder general
        - Arrival                                  2
        - Blocking_rate                            0.5
        - Flow_allocation_failure                  1
        - Holder 1
        - Arrival                                  2
        "###);
        Ok(())
    }

    #[test]
    fn serializes_fresh_values() -> anyhow::Result<()> {
        let mut results = Results::new();
        results.add_computed_value(false, "rate", ratio("fail", "try"), true)?;
        results.increase_value("try", Holder::General, 4.0);
        results.increase_value("fail", Holder::General, 1.0);
        results.increase_value("try", node(3), 1.0);
        let json = serde_json::to_value(&results)?;
        assert_eq!(json["general"]["rate"], 0.25);
        assert_eq!(json["3"]["try"], 1.0);
        Ok(())
    }
}
