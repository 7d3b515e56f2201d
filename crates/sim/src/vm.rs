use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type VmId = u32;
pub type UserId = u32;

/// Service class of a task or a VM. A VM serves tasks of its own class only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "VoIP")]
    Voip,
    #[serde(rename = "IP_Video")]
    IpVideo,
    #[serde(rename = "FTP")]
    Ftp,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Voip, TaskType::IpVideo, TaskType::Ftp];

    pub fn index(self) -> usize {
        match self {
            TaskType::Voip => 0,
            TaskType::IpVideo => 1,
            TaskType::Ftp => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Cloud,
    Edge,
}

/// Generated bandwidth/delay of the path between one user and one VM.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct UserLink {
    pub bw_up: f64,
    pub bw_down: f64,
    pub delay: f64,
}

/// One virtual machine. `cr`, `avg_bw_up` and `avg_bw_down` are mutated by
/// task bind/release; `price` is rewritten once per round by the lease
/// markdown.
#[derive(Clone, Debug)]
pub struct Vm {
    pub id: VmId,
    pub task_type: TaskType,
    pub location: Location,
    /// Remaining compute rate.
    pub cr: f64,
    pub price: f64,
    pub origin_price: f64,
    /// Static capacity of the VM-side link.
    pub local_bw_up: f64,
    pub local_bw_down: f64,
    /// Mean bandwidth over reachable users, consumed by running tasks.
    pub avg_bw_up: f64,
    pub avg_bw_down: f64,
    pub from_user: BTreeMap<UserId, UserLink>,
}

/// Owns every VM of the simulation; the optimizer and the placement engine
/// only read or mutate fields through it.
#[derive(Clone, Debug, Default)]
pub struct VmRegistry {
    vms: BTreeMap<VmId, Vm>,
}

impl VmRegistry {
    pub fn new(vms: BTreeMap<VmId, Vm>) -> Self {
        Self { vms }
    }

    pub fn get(&self, id: VmId) -> Option<&Vm> {
        self.vms.get(&id)
    }

    pub fn get_mut(&mut self, id: VmId) -> Option<&mut Vm> {
        self.vms.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<VmId> {
        self.vms.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.vms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VmId, &Vm)> {
        self.vms.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&VmId, &mut Vm)> {
        self.vms.iter_mut()
    }

    /// Recompute `avg_bw_up`/`avg_bw_down` as the mean over per-user links.
    /// VMs with no reachable users keep their previous averages.
    pub fn refresh_avg_bw(&mut self) {
        for vm in self.vms.values_mut() {
            if vm.from_user.is_empty() {
                continue;
            }
            let n = vm.from_user.len() as f64;
            vm.avg_bw_up = vm.from_user.values().map(|link| link.bw_up).sum::<f64>() / n;
            vm.avg_bw_down = vm.from_user.values().map(|link| link.bw_down).sum::<f64>() / n;
        }
    }

    /// Per-task-type (cr, avg_bw_up, avg_bw_down) sums and cloud/edge counts
    /// over a subset of VM ids.
    pub fn subset_resources(&self, ids: &[VmId]) -> [[f64; 3]; 3] {
        let mut sums = [[0.0; 3]; 3];
        for id in ids {
            if let Some(vm) = self.vms.get(id) {
                let idx = vm.task_type.index();
                sums[idx][0] += vm.cr;
                sums[idx][1] += vm.avg_bw_up;
                sums[idx][2] += vm.avg_bw_down;
            }
        }
        sums
    }
}
