//! Loading of VM attributes and task event streams from JSON snapshot files.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::task::TaskEvent;
use crate::vm::{Location, TaskType, Vm, VmId, VmRegistry};

/// One row of `machine_attributes.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VmSpec {
    pub id: VmId,
    pub task_type: TaskType,
    pub location: Location,
    pub cpu_capacity: f64,
    pub price: f64,
    #[serde(default = "default_local_bw")]
    pub local_bw_up: f64,
    #[serde(default = "default_local_bw")]
    pub local_bw_down: f64,
}

fn default_local_bw() -> f64 {
    1e9
}

impl From<VmSpec> for Vm {
    fn from(spec: VmSpec) -> Self {
        Vm {
            id: spec.id,
            task_type: spec.task_type,
            location: spec.location,
            cr: spec.cpu_capacity,
            price: spec.price,
            origin_price: spec.price,
            local_bw_up: spec.local_bw_up,
            local_bw_down: spec.local_bw_down,
            avg_bw_up: 0.0,
            avg_bw_down: 0.0,
            from_user: BTreeMap::new(),
        }
    }
}

pub fn registry_from_specs(specs: Vec<VmSpec>) -> VmRegistry {
    VmRegistry::new(specs.into_iter().map(|spec| (spec.id, Vm::from(spec))).collect())
}

pub fn load_vms<P: AsRef<Path>>(path: P) -> Result<VmRegistry, SimulationError> {
    let specs: Vec<VmSpec> = load_json(path)?;
    Ok(registry_from_specs(specs))
}

pub fn load_events<P: AsRef<Path>>(path: P) -> Result<Vec<TaskEvent>, SimulationError> {
    load_json(path)
}

fn load_json<P: AsRef<Path>, T: for<'de> Deserialize<'de>>(path: P) -> Result<T, SimulationError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| SimulationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SimulationError::Json {
        path: path.to_path_buf(),
        source,
    })
}
