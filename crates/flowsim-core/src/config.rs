//! This module turns already-parsed configuration records into typed values. A configuration
//! ([`ConfigSpec`]) is four lists of flat attribute maps: nodes, edges, simulation parameters and
//! timed user events. Every record is checked up front; any missing or malformed field fails the
//! whole load.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::network::{Link, Node, NodeError, NodeId, Topology, TopologyError};
use crate::opts::SimOpts;
use crate::units::{Rate, Time};

/// One configuration record.
pub type AttrMap = BTreeMap<String, String>;

/// A configuration as read from a file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfigSpec {
    pub nodes: Vec<AttrMap>,
    pub edges: Vec<AttrMap>,
    /// Simulation parameters. Later records override earlier ones.
    pub simulation: Vec<AttrMap>,
    #[serde(default)]
    pub events: Vec<AttrMap>,
}

impl ConfigSpec {
    /// Validate a configuration, producing a `ValidConfig`.
    ///
    /// Correctness properties:
    ///
    /// - Every required field of every record is present and well-formed
    /// - The nodes and edges form a valid [`Topology`]
    /// - Every user event targets a declared node
    pub fn validate(&self) -> Result<ValidConfig, ConfigError> {
        let nodes = self
            .nodes
            .iter()
            .map(parse_node)
            .collect::<Result<Vec<_>, _>>()?;
        let links = self
            .edges
            .iter()
            .map(parse_link)
            .collect::<Result<Vec<_>, _>>()?;
        let topology = Topology::new(&nodes, &links)?;
        let opts = parse_opts(&self.simulation)?;
        let events = self
            .events
            .iter()
            .map(parse_user_event)
            .collect::<Result<Vec<_>, _>>()?;
        // CORRECTNESS: Every user event targets a declared node.
        for event in &events {
            if let UserEventKind::ArrivalBurst { target, .. } = event.kind {
                if topology.idx_of(target).is_none() {
                    return Err(ConfigError::UnknownTarget(target));
                }
            }
        }
        Ok(ValidConfig {
            topology,
            opts,
            events,
        })
    }
}

/// A `ValidConfig` is a `ConfigSpec` that has been validated.
#[derive(Debug, Clone)]
pub struct ValidConfig {
    pub topology: Topology,
    pub opts: SimOpts,
    pub events: Vec<UserEvent>,
}

/// An event injected from the configuration rather than generated by the simulation.
#[derive(Debug, Clone, PartialEq, derive_new::new, serde::Serialize)]
pub struct UserEvent {
    /// Handling time.
    pub at: Time,
    pub kind: UserEventKind,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum UserEventKind {
    /// Sets the arrival rate of `target` to `rate`.
    ArrivalBurst { target: NodeId, rate: Rate },
    /// Snapshots `value` every `period`.
    Sample { value: String, period: Time },
    /// Keeps the run going until its handling time.
    Watcher,
}

const NODE: &str = "node";
const EDGE: &str = "edge";
const SIMULATION: &str = "simulation";
const EVENT: &str = "event";

/// Parses a node record: `id`, `arrival_rate`, `service_rate` and an optional `name`.
pub fn parse_node(attrs: &AttrMap) -> Result<Node, ConfigError> {
    let id = NodeId::new(parse(attrs, NODE, "id")?);
    let arrival_rate: f64 = parse(attrs, NODE, "arrival_rate")?;
    let service_rate: f64 = parse(attrs, NODE, "service_rate")?;
    let node = Node::new(id, arrival_rate, service_rate)?;
    Ok(match attrs.get("name") {
        Some(name) => node.with_name(name.trim()),
        None => node,
    })
}

/// Parses an edge record: `source_id`, `destination_id`, `weight`, `capacity` and
/// `unidirectional`.
pub fn parse_link(attrs: &AttrMap) -> Result<Link, ConfigError> {
    let a = NodeId::new(parse(attrs, EDGE, "source_id")?);
    let b = NodeId::new(parse(attrs, EDGE, "destination_id")?);
    let weight = parse(attrs, EDGE, "weight")?;
    let capacity = parse(attrs, EDGE, "capacity")?;
    let unidirectional = match field(attrs, EDGE, "unidirectional")? {
        v if v.eq_ignore_ascii_case("true") => true,
        v if v.eq_ignore_ascii_case("false") => false,
        v => return Err(invalid(EDGE, "unidirectional", v)),
    };
    Ok(Link {
        a,
        b,
        capacity,
        weight,
        unidirectional,
    })
}

/// Parses the simulation records into options: `check_interval`, `number_samples` and `epsilon`
/// are required, `seed`, `end_time` and `max_events` are optional.
pub fn parse_opts(records: &[AttrMap]) -> Result<SimOpts, ConfigError> {
    let attrs = records
        .iter()
        .flat_map(|r| r.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect::<AttrMap>();
    let check_interval: u64 = parse(&attrs, SIMULATION, "check_interval")?;
    if check_interval == 0 {
        return Err(invalid(SIMULATION, "check_interval", "0"));
    }
    let nr_samples: usize = parse(&attrs, SIMULATION, "number_samples")?;
    if nr_samples == 0 {
        return Err(invalid(SIMULATION, "number_samples", "0"));
    }
    let epsilon: f64 = parse(&attrs, SIMULATION, "epsilon")?;
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(invalid(SIMULATION, "epsilon", &epsilon.to_string()));
    }
    let seed = parse_opt(&attrs, SIMULATION, "seed")?.unwrap_or_default();
    let end_time = match parse_opt::<f64>(&attrs, SIMULATION, "end_time")? {
        Some(t) if t.is_finite() && t >= 0.0 => Some(Time::new(t)),
        Some(t) => return Err(invalid(SIMULATION, "end_time", &t.to_string())),
        None => None,
    };
    let max_events = parse_opt(&attrs, SIMULATION, "max_events")?;
    Ok(SimOpts {
        check_interval,
        nr_samples,
        epsilon,
        seed,
        end_time,
        max_events,
    })
}

/// Parses a timed user event: `trigger_type` (only `time`), `trigger_value`, `type`, and for
/// bursts and samples `event_target` and `effect_value`.
pub fn parse_user_event(attrs: &AttrMap) -> Result<UserEvent, ConfigError> {
    let trigger = field(attrs, EVENT, "trigger_type")?;
    if trigger != "time" {
        return Err(ConfigError::UnsupportedTrigger(trigger.to_owned()));
    }
    let at: f64 = parse(attrs, EVENT, "trigger_value")?;
    if !(at.is_finite() && at >= 0.0) {
        return Err(invalid(EVENT, "trigger_value", &at.to_string()));
    }
    let kind = match field(attrs, EVENT, "type")? {
        "arrival_burst_event" => {
            let rate: f64 = parse(attrs, EVENT, "effect_value")?;
            let rate = Rate::new(rate);
            if !rate.is_valid() {
                return Err(invalid(EVENT, "effect_value", &rate.to_string()));
            }
            UserEventKind::ArrivalBurst {
                target: NodeId::new(parse(attrs, EVENT, "event_target")?),
                rate,
            }
        }
        "sample_event" => UserEventKind::Sample {
            value: field(attrs, EVENT, "event_target")?.to_owned(),
            period: Time::new(parse(attrs, EVENT, "effect_value")?),
        },
        "watcher_event" => UserEventKind::Watcher,
        other => return Err(ConfigError::UnknownEventType(other.to_owned())),
    };
    Ok(UserEvent::new(Time::new(at), kind))
}

fn field<'a>(
    attrs: &'a AttrMap,
    record: &'static str,
    name: &'static str,
) -> Result<&'a str, ConfigError> {
    attrs
        .get(name)
        .map(|v| v.trim())
        .ok_or(ConfigError::MissingField { record, field: name })
}

fn parse<T: FromStr>(
    attrs: &AttrMap,
    record: &'static str,
    name: &'static str,
) -> Result<T, ConfigError> {
    let value = field(attrs, record, name)?;
    value.parse().map_err(|_| invalid(record, name, value))
}

fn parse_opt<T: FromStr>(
    attrs: &AttrMap,
    record: &'static str,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match attrs.get(name) {
        Some(_) => parse(attrs, record, name).map(Some),
        None => Ok(None),
    }
}

fn invalid(record: &'static str, field: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidField {
        record,
        field,
        value: value.to_owned(),
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required field is absent.
    #[error("{record} record is missing field `{field}`")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    /// A field could not be parsed or is out of range.
    #[error("{record} record has invalid `{field}` ({value:?})")]
    InvalidField {
        record: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("unsupported trigger type {0:?}")]
    UnsupportedTrigger(String),

    #[error("unknown event type {0:?}")]
    UnknownEventType(String),

    /// A user event targets a node that is not declared.
    #[error("event targets undeclared node {0}")]
    UnknownTarget(NodeId),

    #[error("invalid node")]
    InvalidNode(#[from] NodeError),

    #[error("invalid topology")]
    InvalidTopology(#[from] TopologyError),
}
