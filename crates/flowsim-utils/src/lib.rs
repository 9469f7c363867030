//! Utilities for interfacing with flowsim.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::path::{Path, PathBuf};

use flowsim_core::{ConfigError, ConfigSpec, Results, ValidConfig};

/// Reads and validates a configuration from a file containing a [`ConfigSpec`] in JSON or Dhall
/// format.
pub fn read_simulation(path: impl AsRef<Path>) -> Result<ValidConfig, Error> {
    let spec = read_config(path)?;
    Ok(spec.validate()?)
}

/// Reads a [`ConfigSpec`] from a file in JSON or Dhall format.
pub fn read_config(path: impl AsRef<Path>) -> Result<ConfigSpec, Error> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let spec: ConfigSpec = match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        Some("dhall") => serde_dhall::from_str(&contents).parse().map_err(Box::new)?,
        _ => return Err(Error::UnknownFileType(path.as_ref().into())),
    };
    Ok(spec)
}

/// Writes [`Results`] to a file in JSON format.
pub fn write_results(path: impl AsRef<Path>, results: &Results) -> Result<(), Error> {
    let contents = serde_json::to_string_pretty(results)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Error kinds for configurations and I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// Error serializing/deserializing Dhall.
    #[error("Dhall error")]
    Dhall(#[from] Box<serde_dhall::Error>),

    /// Error serializing/deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// Error validating a configuration.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const JSON: &str = r#"{
        "nodes": [
            {"id": "0", "arrival_rate": "1", "service_rate": "1"},
            {"id": "1", "arrival_rate": "0", "service_rate": "1", "name": "sink"}
        ],
        "edges": [
            {"source_id": "0", "destination_id": "1", "weight": "1", "capacity": "1",
             "unidirectional": "false"}
        ],
        "simulation": [{"check_interval": "10", "number_samples": "6", "epsilon": "0.03"}],
        "events": [
            {"type": "watcher_event", "trigger_type": "time", "trigger_value": "5"}
        ]
    }"#;

    const DHALL: &str = r#"
        { nodes =
          [ { id = "0", arrival_rate = "1", service_rate = "1" }
          , { id = "1", arrival_rate = "0", service_rate = "1" }
          ]
        , edges =
          [ { source_id = "0"
            , destination_id = "1"
            , weight = "1"
            , capacity = "1"
            , unidirectional = "false"
            }
          ]
        , simulation = [ { check_interval = "10", number_samples = "6", epsilon = "0.03" } ]
        }
    "#;

    fn file(suffix: &str, contents: &str) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile()?;
        f.write_all(contents.as_bytes())?;
        Ok(f)
    }

    #[test]
    fn reads_json() -> anyhow::Result<()> {
        let f = file(".json", JSON)?;
        let config = read_simulation(f.path())?;
        assert_eq!(config.topology.nr_nodes(), 2);
        assert_eq!(config.topology.nr_edges(), 2);
        assert_eq!(config.opts.check_interval, 10);
        assert_eq!(config.events.len(), 1);
        Ok(())
    }

    #[test]
    fn reads_dhall() -> anyhow::Result<()> {
        let f = file(".dhall", DHALL)?;
        let spec = read_config(f.path())?;
        assert_eq!(spec.nodes.len(), 2);
        assert!(spec.events.is_empty());
        assert!(spec.validate().is_ok());
        Ok(())
    }

    #[test]
    fn unknown_extension_fails() -> anyhow::Result<()> {
        let f = file(".xml", JSON)?;
        assert!(matches!(
            read_config(f.path()),
            Err(Error::UnknownFileType(..))
        ));
        Ok(())
    }

    #[test]
    fn invalid_config_fails() -> anyhow::Result<()> {
        let f = file(".json", &JSON.replace(r#""capacity": "1""#, r#""capacity": "0""#))?;
        assert!(matches!(read_simulation(f.path()), Err(Error::Config(..))));
        Ok(())
    }

    #[test]
    fn writes_results() -> anyhow::Result<()> {
        let mut sim = flowsim_core::Simulation::from_config(read_simulation(file(".json", JSON)?.path())?)?;
        sim.run()?;
        let out = tempfile::Builder::new().suffix(".json").tempfile()?;
        write_results(out.path(), sim.results())?;
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(out.path())?)?;
        assert!(json["general"]["Arrival"].as_f64().is_some());
        Ok(())
    }
}
