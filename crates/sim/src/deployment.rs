//! Online task placement: scoring, binding, bounded reschedule and the
//! end-of-period drain.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};
use rand::Rng;
use rand_pcg::Pcg64;

use crate::config::{RetryConfig, SimulationConfig};
use crate::deploy_optimizing::{DeployParams, DeployParamsOptimizing};
use crate::event_store::EventStore;
use crate::metrics::OperatorMetrics;
use crate::task::TaskEvent;
use crate::utility::UtilityThresholds;
use crate::vm::{Location, VmId, VmRegistry};

/// Utilities within this distance count as a tie and fall through to the
/// resource-based tie-break.
const UTILITY_EPS: f64 = 1e-9;

/// Counters of one deployment period (an hour), indexed by task type.
#[derive(Clone, Debug, Default)]
pub struct PeriodStats {
    pub utility: [f64; 3],
    pub task_num: [u32; 3],
    pub blocked: [u32; 3],
    pub resource: [[f64; 3]; 3],
    pub cloud_tasks: [u32; 3],
    pub edge_tasks: [u32; 3],
    pub user_cost: f64,
}

pub struct TaskPlacementEngine {
    label: String,
    pub optimizing: DeployParamsOptimizing,
    pub stats: PeriodStats,
    /// task id -> VM it runs on; exactly one entry per bound task.
    running: BTreeMap<u64, VmId>,
    retry_times: HashMap<u64, u32>,
    period_start: f64,
    period_minutes: f64,
    retry: RetryConfig,
    utility_floor: f64,
    scores: UtilityThresholds,
}

impl TaskPlacementEngine {
    pub fn new(label: &str, op_bw: f64, op_cr: f64, config: &SimulationConfig, rng: &mut Pcg64) -> Self {
        let initial = DeployParams {
            gamma: config.gamma,
            op_bw,
            op_cr,
        };
        Self {
            label: label.to_string(),
            optimizing: DeployParamsOptimizing::new(initial, config.deploy_ga.clone(), rng),
            stats: PeriodStats::default(),
            running: BTreeMap::new(),
            retry_times: HashMap::new(),
            period_start: 0.0,
            period_minutes: config.small_round_minutes,
            retry: config.retry.clone(),
            utility_floor: config.utility_floor,
            scores: config.utility.clone(),
        }
    }

    pub fn running_tasks(&self) -> usize {
        self.running.len()
    }

    pub fn bound_vm(&self, task_id: u64) -> Option<VmId> {
        self.running.get(&task_id).copied()
    }

    /// Reset the period counters. The ledger must be empty: the previous
    /// period's drain force-released everything.
    pub fn begin_period(&mut self, now: f64) {
        debug_assert!(self.running.is_empty());
        self.period_start = now;
        self.stats = PeriodStats::default();
        self.retry_times.clear();
        self.optimizing.reset_period();
    }

    /// Score every type-matching, resource-feasible candidate, bind the task
    /// to the best one, or reschedule/drop through the retry policy.
    pub fn deploy(
        &mut self,
        candidates: &[VmId],
        task: &TaskEvent,
        registry: &mut VmRegistry,
        store: &mut EventStore,
        rng: &mut Pcg64,
    ) {
        let type_idx = task.task_type.index();
        self.stats.task_num[type_idx] += 1;

        let virtual_params = self.optimizing.decoded_offsprings();
        let mut virtual_best = vec![f64::NEG_INFINITY; virtual_params.len()];
        // (utility, (cr, bw_up, bw_down), vm id, price)
        let mut best: Option<(f64, (f64, f64, f64), VmId, f64)> = None;

        for &vm_id in candidates {
            let Some(vm) = registry.get(vm_id) else { continue };
            if vm.task_type != task.task_type {
                continue;
            }
            let Some(link) = vm.from_user.get(&task.user_id) else { continue };
            let live = &self.optimizing.best_params;
            if link.bw_up.min(link.bw_down) < live.op_bw
                || vm.cr < live.op_cr
                || vm.cr < task.average_cpu_usage
                || vm.local_bw_up < task.t_up
                || vm.local_bw_down < task.t_down
                || vm.avg_bw_up < task.t_up
                || vm.avg_bw_down < task.t_down
            {
                continue;
            }
            let scores = [
                self.scores.bw_up(task.task_type, link.bw_up),
                self.scores.bw_down(task.task_type, link.bw_down),
                self.scores.price(vm.price),
                self.scores.delay(link.delay, vm.location),
            ];
            let utility = live.utility(type_idx, &scores);
            for (idx, params) in virtual_params.iter().enumerate() {
                if link.bw_up.min(link.bw_down) < params.op_bw || vm.cr < params.op_cr {
                    continue;
                }
                virtual_best[idx] = virtual_best[idx].max(params.utility(type_idx, &scores));
            }
            let resource = (vm.cr, link.bw_up, link.bw_down);
            let better = match &best {
                None => true,
                Some((best_utility, best_resource, _, _)) => {
                    utility > best_utility + UTILITY_EPS
                        || ((utility - best_utility).abs() <= UTILITY_EPS && resource > *best_resource)
                }
            };
            if better {
                best = Some((utility, resource, vm_id, vm.price));
            }
        }

        let max_utility = best.as_ref().map_or(f64::NEG_INFINITY, |found| found.0);
        match best {
            Some((utility, _, vm_id, price)) => {
                debug!(
                    "{}: task {} -> vm {} with utility {:.3}",
                    self.label, task.task_id, vm_id, utility
                );
                self.bind(task, vm_id, registry);
                self.stats.user_cost += price;
            }
            None => self.reject(task, store, rng),
        }
        self.stats.utility[type_idx] += max_utility.max(self.utility_floor);
        for (idx, utility) in virtual_best.into_iter().enumerate() {
            self.optimizing.add_virtual_utility(idx, utility);
        }
    }

    /// Credit the task's resources back to its VM and clear the ledger entry.
    pub fn release(&mut self, task: &TaskEvent, registry: &mut VmRegistry) {
        let Some(vm_id) = self.running.remove(&task.task_id) else {
            debug!("{}: release of task {} ignored, not bound", self.label, task.task_id);
            return;
        };
        if let Some(vm) = registry.get_mut(vm_id) {
            vm.cr += task.average_cpu_usage;
            vm.avg_bw_up += task.t_up;
            vm.avg_bw_down += task.t_down;
            debug!(
                "{}: release task {} from vm {}, cr back to {:.3}",
                self.label, task.task_id, vm_id, vm.cr
            );
        }
    }

    /// Finalize period fitness, evolve the deployment parameters, drain the
    /// ledger and flush one metrics row. The caller must invoke this at every
    /// period end, even when the period saw no events.
    pub fn end_period(
        &mut self,
        registry: &mut VmRegistry,
        store: &mut EventStore,
        rng: &mut Pcg64,
        out: &mut OperatorMetrics,
    ) {
        let mut fitness = [0.0; 3];
        for idx in 0..3 {
            let num = self.stats.task_num[idx].max(1) as f64;
            fitness[idx] = self.stats.utility[idx].max(0.0) / num;
        }
        let total_tasks: u32 = self.stats.task_num.iter().sum();
        self.optimizing.update_parameters(total_tasks, rng);

        self.drain(registry, store, rng);

        let mut block_rate = [0.0; 3];
        for idx in 0..3 {
            let blocked = self.stats.blocked[idx] as f64;
            let admitted = self.stats.task_num[idx] as f64;
            if blocked + admitted > 0.0 {
                block_rate[idx] = blocked / (blocked + admitted);
            }
        }
        let admitted: u32 = self.stats.task_num.iter().sum();
        out.task_fitness.push(fitness);
        out.block_rate.push(block_rate);
        out.task_resource.push(self.stats.resource);
        out.user_cost.push(if admitted > 0 {
            self.stats.user_cost / admitted as f64
        } else {
            0.0
        });
        out.cloud_task_num.push(self.stats.cloud_tasks);
        out.edge_task_num.push(self.stats.edge_tasks);
        info!(
            "{}: period fitness {:?}, admitted {:?}, blocked {:?}",
            self.label, fitness, self.stats.task_num, self.stats.blocked
        );
    }

    fn bind(&mut self, task: &TaskEvent, vm_id: VmId, registry: &mut VmRegistry) {
        let Some(vm) = registry.get_mut(vm_id) else { return };
        vm.cr -= task.average_cpu_usage;
        vm.avg_bw_up -= task.t_up;
        vm.avg_bw_down -= task.t_down;
        let idx = task.task_type.index();
        self.stats.resource[idx][0] += task.average_cpu_usage;
        self.stats.resource[idx][1] += task.t_up;
        self.stats.resource[idx][2] += task.t_down;
        match vm.location {
            Location::Cloud => self.stats.cloud_tasks[idx] += 1,
            Location::Edge => self.stats.edge_tasks[idx] += 1,
        }
        self.running.insert(task.task_id, vm_id);
    }

    /// Bounded retry: reschedule the task's timeline while attempts remain,
    /// drop its events for good once they are spent. A task enters the
    /// blocked counter exactly once, when it is dropped.
    fn reject(&mut self, task: &TaskEvent, store: &mut EventStore, rng: &mut Pcg64) {
        let idx = task.task_type.index();
        self.stats.task_num[idx] -= 1;
        let tries = self.retry_times.entry(task.task_id).or_insert(0);
        if *tries < self.retry.retry_cap {
            *tries += 1;
            let attempt = *tries;
            debug!(
                "{}: task {} unaccepted, reschedule attempt {} of {}",
                self.label, task.task_id, attempt, self.retry.retry_cap
            );
            self.reschedule(task.task_id, store, rng);
        } else {
            store.extract(task.task_id);
            self.stats.blocked[idx] += 1;
            debug!(
                "{}: task {} dropped after {} reschedules",
                self.label, task.task_id, self.retry.retry_cap
            );
        }
    }

    /// Pull both events of a task, shift them by a random retry offset, and
    /// reinsert in time order. A task whose shifted end would cross the next
    /// period boundary restarts at that boundary with its duration preserved.
    fn reschedule(&mut self, task_id: u64, store: &mut EventStore, rng: &mut Pcg64) {
        let Some((mut start, mut end)) = store.extract(task_id) else {
            warn!("{}: task {} has no events to reschedule", self.label, task_id);
            return;
        };
        let next_period_start = self.period_start + self.period_minutes;
        let offset = rng.gen_range(self.retry.retry_min..self.retry.retry_max);
        if start.time + offset < next_period_start && end.time + offset >= next_period_start {
            let duration = end.time - start.time;
            start.time = next_period_start;
            end.time = next_period_start + duration;
            debug!(
                "{}: task {} moved to the next period at {:.1}",
                self.label, task_id, next_period_start
            );
        } else {
            start.time += offset;
            end.time += offset;
            debug!("{}: task {} retried after {:.1} minutes", self.label, task_id, offset);
        }
        store.insert(end);
        store.insert(start);
    }

    /// End-of-period drain: every still-running task is force-rescheduled and
    /// force-released so the round can close with an empty ledger.
    fn drain(&mut self, registry: &mut VmRegistry, store: &mut EventStore, rng: &mut Pcg64) {
        if !self.running.is_empty() {
            debug!(
                "{}: draining {} task(s) still running at period end",
                self.label,
                self.running.len()
            );
        }
        let task_ids: Vec<u64> = self.running.keys().copied().collect();
        for task_id in task_ids {
            let event = store.select(task_id).first().map(|found| (*found).clone());
            self.reschedule(task_id, store, rng);
            match event {
                Some(event) => {
                    let idx = event.task_type.index();
                    self.stats.task_num[idx] = self.stats.task_num[idx].saturating_sub(1);
                    self.stats.blocked[idx] += 1;
                    self.release(&event, registry);
                }
                None => {
                    warn!("{}: running task {} missing from the event store", self.label, task_id);
                    self.running.remove(&task_id);
                }
            }
        }
    }
}
