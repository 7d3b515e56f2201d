//! MNO and MVNO wrappers around the placement engine and, for the MNO, the
//! per-round capacity partitioning.

use log::info;
use rand_pcg::Pcg64;

use crate::config::SimulationConfig;
use crate::deployment::TaskPlacementEngine;
use crate::error::SimulationError;
use crate::event_store::EventStore;
use crate::metrics::{Metrics, OperatorMetrics};
use crate::task::{DemandMatrix, TaskEvent};
use crate::vm::{VmId, VmRegistry};
use crate::vm_assignment::VmAssignment;

pub struct Operator {
    pub name: &'static str,
    pub hold_vm_ids: Vec<VmId>,
    pub engine: TaskPlacementEngine,
}

impl Operator {
    pub fn new(name: &'static str, op_bw: f64, op_cr: f64, config: &SimulationConfig, rng: &mut Pcg64) -> Self {
        Self {
            name,
            hold_vm_ids: Vec::new(),
            engine: TaskPlacementEngine::new(name, op_bw, op_cr, config, rng),
        }
    }

    pub fn deploy_task(
        &mut self,
        task: &TaskEvent,
        registry: &mut VmRegistry,
        store: &mut EventStore,
        rng: &mut Pcg64,
    ) {
        self.engine.deploy(&self.hold_vm_ids, task, registry, store, rng);
    }

    pub fn release_task(&mut self, task: &TaskEvent, registry: &mut VmRegistry) {
        self.engine.release(task, registry);
    }

    pub fn begin_period(&mut self, now: f64) {
        self.engine.begin_period(now);
    }

    pub fn end_period(
        &mut self,
        registry: &mut VmRegistry,
        store: &mut EventStore,
        rng: &mut Pcg64,
        out: &mut OperatorMetrics,
    ) {
        self.engine.end_period(registry, store, rng, out);
    }
}

/// The primary operator: owns the full VM pool and the contract, refreshes
/// the leased partition once per round.
pub struct Mno {
    pub operator: Operator,
    total_vm_ids: Vec<VmId>,
    config: SimulationConfig,
}

impl Mno {
    pub fn new(total_vm_ids: Vec<VmId>, config: &SimulationConfig, rng: &mut Pcg64) -> Self {
        Self {
            operator: Operator::new("MNO", config.mno_op_bw, config.mno_op_cr, config, rng),
            total_vm_ids,
            config: config.clone(),
        }
    }

    /// Refresh VM averages, search a contract-feasible partition, apply the
    /// per-round lease markdown, and record the round outputs. Returns the
    /// ids leased to the MVNO.
    pub fn vm_assignment(
        &mut self,
        demand: &DemandMatrix,
        registry: &mut VmRegistry,
        rng: &mut Pcg64,
        metrics: &mut Metrics,
    ) -> Result<Vec<VmId>, SimulationError> {
        registry.refresh_avg_bw();
        let mut assignment = VmAssignment::new(
            self.config.contract,
            self.total_vm_ids.clone(),
            registry,
            self.config.ga.clone(),
            self.config.theta,
            self.config.lambda,
        );
        let (mno_ids, mvno_ids) = assignment.run(demand, registry, rng)?;
        let lease_cost = assignment.highest_price - assignment.optimizing.best_fitness;

        // per-round lease markdown: leased VMs are re-priced for the MVNO's
        // customers, kept VMs return to their origin price
        for id in &mno_ids {
            if let Some(vm) = registry.get_mut(*id) {
                vm.price = vm.origin_price;
            }
        }
        for id in &mvno_ids {
            if let Some(vm) = registry.get_mut(*id) {
                vm.price = vm.origin_price * self.config.mu;
            }
        }

        info!(
            "partition refreshed: {} VMs kept, {} leased, lease cost {:.2}",
            mno_ids.len(),
            mvno_ids.len(),
            lease_cost
        );
        metrics.mno_vm_resource.push(registry.subset_resources(&mno_ids));
        metrics.mvno_vm_resource.push(registry.subset_resources(&mvno_ids));
        metrics.mvno_vm_cost.push(lease_cost);
        metrics.partition_fitness.push(assignment.optimizing.best_fitness);
        metrics.mno_hold_ids.push(mno_ids.clone());
        metrics.mvno_hold_ids.push(mvno_ids.clone());

        self.operator.hold_vm_ids = mno_ids;
        Ok(mvno_ids)
    }
}
