use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimulationError {
    /// The partition search ran out of attempts. This signals an infeasible
    /// contract/demand configuration, not a transient fault.
    #[error("no feasible capacity partition after {attempts} attempts: infeasible contract/capacity configuration")]
    SearchExhausted { attempts: u32 },

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {path}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
