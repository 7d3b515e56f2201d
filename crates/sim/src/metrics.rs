//! Accumulated simulation outputs, consumed by the experiment tooling.

use serde::{Deserialize, Serialize};

use crate::task::DemandMatrix;
use crate::vm::VmId;

/// Per-period rows of one operator, one entry per simulated hour.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OperatorMetrics {
    /// Average placement utility per task type.
    pub task_fitness: Vec<[f64; 3]>,
    /// blocked / (blocked + admitted) per task type.
    pub block_rate: Vec<[f64; 3]>,
    /// Consumed (cr, t_up, t_down) per task type.
    pub task_resource: Vec<[[f64; 3]; 3]>,
    /// Average price paid per admitted task.
    pub user_cost: Vec<f64>,
    pub cloud_task_num: Vec<[u32; 3]>,
    pub edge_task_num: Vec<[u32; 3]>,
}

/// Whole-run accumulator. Per-hour rows come from the placement engines,
/// per-round rows from the partition refresh.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub mno: OperatorMetrics,
    pub mvno: OperatorMetrics,
    /// Hourly per-type demand sums.
    pub hour_demand: Vec<DemandMatrix>,
    /// Per-round held subsets.
    pub mno_hold_ids: Vec<Vec<VmId>>,
    pub mvno_hold_ids: Vec<Vec<VmId>>,
    /// Per-round (cr, bw_up, bw_down) sums per task type of each subset.
    pub mno_vm_resource: Vec<[[f64; 3]; 3]>,
    pub mvno_vm_resource: Vec<[[f64; 3]; 3]>,
    /// Per-round lease cost and fitness of the accepted partition.
    pub mvno_vm_cost: Vec<f64>,
    pub partition_fitness: Vec<f64>,
}
