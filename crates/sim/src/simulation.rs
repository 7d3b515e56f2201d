//! The big-round/small-round driver: owns the event store, the simulated
//! clock, the RNG and the metrics accumulator, and threads them explicitly
//! through the decision engines.

use std::collections::BTreeSet;
use std::path::Path;

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::event_store::EventStore;
use crate::metrics::Metrics;
use crate::operator::{Mno, Operator};
use crate::parser;
use crate::task::{demand_of_events, DemandMatrix, EventType, TaskEvent};
use crate::vm::{UserId, VmRegistry};

pub struct Simulation {
    config: SimulationConfig,
    pub registry: VmRegistry,
    pub store: EventStore,
    pub metrics: Metrics,
    pub demand: DemandMatrix,
    rng: Pcg64,
    time: f64,
    mno: Mno,
    mvno: Operator,
    /// Demand rows of the current round, folded into `demand` with phi.
    hour_rows: Vec<DemandMatrix>,
    linked_users: BTreeSet<UserId>,
    mvno_users: BTreeSet<UserId>,
    mno_users: BTreeSet<UserId>,
}

impl Simulation {
    pub fn new(
        config: SimulationConfig,
        registry: VmRegistry,
        history: Vec<TaskEvent>,
        events: Vec<TaskEvent>,
    ) -> Self {
        let mut rng = Pcg64::seed_from_u64(config.seed);
        let mno = Mno::new(registry.ids(), &config, &mut rng);
        let mvno = Operator::new("MVNO", config.mvno_op_bw, config.mvno_op_cr, &config, &mut rng);
        let mut sim = Self {
            registry,
            store: EventStore::new(events),
            metrics: Metrics::default(),
            demand: DemandMatrix::default(),
            rng,
            time: 0.0,
            mno,
            mvno,
            hour_rows: Vec::new(),
            linked_users: BTreeSet::new(),
            mvno_users: BTreeSet::new(),
            mno_users: BTreeSet::new(),
            config,
        };
        sim.preprocess_history(&history);
        sim
    }

    /// Load one scenario directory: `machine_attributes.json`,
    /// `task_events.json` and, when present, `history_data.json`.
    pub fn from_case<P: AsRef<Path>>(config: SimulationConfig, dir: P) -> Result<Self, SimulationError> {
        let dir = dir.as_ref();
        let registry = parser::load_vms(dir.join("machine_attributes.json"))?;
        let history_path = dir.join("history_data.json");
        let history = if history_path.exists() {
            parser::load_events(history_path)?
        } else {
            Vec::new()
        };
        let events = parser::load_events(dir.join("task_events.json"))?;
        Ok(Self::new(config, registry, history, events))
    }

    /// Fold task-level history into hourly demand rows, seed the demand
    /// matrix with their mean, and pre-register every user seen in history.
    fn preprocess_history(&mut self, history: &[TaskEvent]) {
        if history.is_empty() {
            return;
        }
        let mut rows = Vec::new();
        let mut from = 0.0;
        while history.iter().any(|event| event.time > from) {
            let to = from + self.config.small_round_minutes;
            let window: Vec<TaskEvent> = history
                .iter()
                .filter(|event| from <= event.time && event.time < to)
                .cloned()
                .collect();
            rows.push(demand_of_events(&window));
            from = to;
        }
        self.demand = mean_demand(&rows);

        // sorted set keeps link generation reproducible
        let users: BTreeSet<UserId> = history.iter().map(|event| event.user_id).collect();
        for user in users {
            self.ensure_user(user);
        }
        info!(
            "preprocessed {} history events into {} hourly rows",
            history.len(),
            rows.len()
        );
    }

    pub fn run(mut self) -> Result<Metrics, SimulationError> {
        let hours_per_round = (self.config.big_round_minutes / self.config.small_round_minutes).round() as u32;
        for round in 0..self.config.big_round_count {
            info!("==== round {} ====", round + 1);
            if !self.hour_rows.is_empty() {
                let fresh = mean_demand(&self.hour_rows);
                for (current, new) in self.demand.iter_mut().zip(fresh) {
                    current.cr = current.cr * (1.0 - self.config.phi) + new.cr * self.config.phi;
                    current.t_up = current.t_up * (1.0 - self.config.phi) + new.t_up * self.config.phi;
                    current.t_down = current.t_down * (1.0 - self.config.phi) + new.t_down * self.config.phi;
                }
                self.hour_rows.clear();
            }
            let mvno_ids = self
                .mno
                .vm_assignment(&self.demand, &mut self.registry, &mut self.rng, &mut self.metrics)?;
            self.mvno.hold_vm_ids = mvno_ids;

            for _ in 0..hours_per_round {
                let from = self.time;
                let to = from + self.config.small_round_minutes;
                self.run_period(from, to);
                self.time = to;
            }
        }
        Ok(self.metrics)
    }

    /// One deployment period: dispatch events in ascending time, re-slicing
    /// the window whenever the store mutates, then always close the period.
    fn run_period(&mut self, from: f64, to: f64) {
        self.mno.operator.begin_period(from);
        self.mvno.begin_period(from);

        let mut window = self.store.window(from, to);
        let mut version = self.store.version();
        let mut idx = 0;
        while idx < window.len() {
            let event = window[idx].clone();
            self.time = event.time;
            self.dispatch(&event);
            if self.store.version() != version {
                // a reschedule or drop moved events around: re-slice and
                // re-examine the same position
                version = self.store.version();
                window = self.store.window(from, to);
            } else {
                idx += 1;
            }
        }

        let row = demand_of_events(&window);
        self.metrics.hour_demand.push(row);
        self.hour_rows.push(row);

        self.mno
            .operator
            .end_period(&mut self.registry, &mut self.store, &mut self.rng, &mut self.metrics.mno);
        self.mvno
            .end_period(&mut self.registry, &mut self.store, &mut self.rng, &mut self.metrics.mvno);
    }

    fn dispatch(&mut self, event: &TaskEvent) {
        match event.event_type {
            EventType::Start => {
                self.ensure_user(event.user_id);
                let operator = if self.mvno_users.contains(&event.user_id) {
                    &mut self.mvno
                } else {
                    &mut self.mno.operator
                };
                operator.deploy_task(event, &mut self.registry, &mut self.store, &mut self.rng);
            }
            EventType::End => {
                let operator = if self.mvno_users.contains(&event.user_id) {
                    &mut self.mvno
                } else {
                    &mut self.mno.operator
                };
                operator.release_task(event, &mut self.registry);
            }
        }
    }

    /// Lazily generate per-VM reachability for a newly seen user and assign
    /// the user to one operator for the rest of the run.
    fn ensure_user(&mut self, user: UserId) {
        if self.linked_users.insert(user) {
            let workload = &self.config.workload;
            for (_, vm) in self.registry.iter_mut() {
                let link = workload.generate_user_link(vm.location, &mut self.rng);
                vm.from_user.insert(user, link);
            }
            debug!("generated reachability links for new user {}", user);
        }
        if !self.mvno_users.contains(&user) && !self.mno_users.contains(&user) {
            if self.rng.gen_bool(self.config.mvno_user_rate.clamp(0.0, 1.0)) {
                self.mvno_users.insert(user);
            } else {
                self.mno_users.insert(user);
            }
        }
    }
}

fn mean_demand(rows: &[DemandMatrix]) -> DemandMatrix {
    let mut mean = DemandMatrix::default();
    if rows.is_empty() {
        return mean;
    }
    for row in rows {
        for (acc, cell) in mean.iter_mut().zip(row) {
            acc.cr += cell.cr;
            acc.t_up += cell.t_up;
            acc.t_down += cell.t_down;
        }
    }
    let n = rows.len() as f64;
    for cell in mean.iter_mut() {
        cell.cr /= n;
        cell.t_up /= n;
        cell.t_down /= n;
    }
    mean
}
