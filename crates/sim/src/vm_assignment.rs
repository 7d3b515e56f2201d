//! Genetic search for a contract-feasible partition of the VM pool between
//! MNO and MVNO.

use log::{debug, log_enabled, warn, Level};
use rand::Rng;
use rand_pcg::Pcg64;

use crate::config::GaConfig;
use crate::contract::Contract;
use crate::error::SimulationError;
use crate::genetic::{segment_shuffle_crossover, sus_select, GeneticOptimizing};
use crate::task::DemandMatrix;
use crate::vm::{TaskType, VmId, VmRegistry};

/// One candidate partition: MVNO membership flag per candidate VM id.
pub type Population = Vec<bool>;

/// Registry and demand snapshot the feasibility predicate evaluates against.
pub struct PartitionSnapshot<'a> {
    pub registry: &'a VmRegistry,
    pub demand: &'a DemandMatrix,
}

pub struct VmSubsetOptimizing {
    contract: Contract,
    candidate_ids: Vec<VmId>,
    ga: GaConfig,
    theta: f64,
    populations: Option<Vec<Population>>,
    pub fitness: Vec<f64>,
    pub best_population: Option<Population>,
    pub best_fitness: f64,
}

impl VmSubsetOptimizing {
    pub fn new(contract: Contract, candidate_ids: Vec<VmId>, ga: GaConfig, theta: f64) -> Self {
        let offspring_number = ga.offspring_number;
        Self {
            contract,
            candidate_ids,
            ga,
            theta,
            populations: None,
            fitness: vec![0.0; offspring_number],
            best_population: None,
            best_fitness: 0.0,
        }
    }

    pub fn candidate_ids(&self) -> &[VmId] {
        &self.candidate_ids
    }

    /// Ids selected by a population mask.
    pub fn masked_ids(&self, population: &[bool]) -> Vec<VmId> {
        self.candidate_ids
            .iter()
            .zip(population)
            .filter(|(_, selected)| **selected)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Random feasible-seeking draw: Bernoulli per VM with success probability
    /// `(1 - mno_rate) * ratio`, `ratio` uniform per attempt. Errors out after
    /// `draw_cap` infeasible draws.
    pub fn choose_vms(
        &self,
        snapshot: &PartitionSnapshot<'_>,
        rng: &mut Pcg64,
    ) -> Result<Population, SimulationError> {
        let mut selected = vec![false; self.candidate_ids.len()];
        let mut tries = 0;
        while !self.check_condition(&selected, snapshot) {
            if tries == self.ga.draw_cap {
                warn!("partition draw cap of {} reached without a feasible mask", tries);
                return Err(SimulationError::SearchExhausted { attempts: tries });
            }
            tries += 1;
            let ratio: f64 = rng.gen();
            let p = ((1.0 - self.ga.mno_rate) * ratio).clamp(0.0, 1.0);
            for flag in selected.iter_mut() {
                *flag = rng.gen_bool(p);
            }
        }
        Ok(selected)
    }

    /// The twelve feasibility conditions of a leased subset, all of which
    /// must hold simultaneously.
    pub fn check_condition(&self, population: &[bool], snapshot: &PartitionSnapshot<'_>) -> bool {
        let mut bw_up = [0.0f64; 3];
        let mut bw_down = [0.0f64; 3];
        let mut cr = [0.0f64; 3];
        for (id, selected) in self.candidate_ids.iter().zip(population) {
            if !selected {
                continue;
            }
            if let Some(vm) = snapshot.registry.get(*id) {
                let idx = vm.task_type.index();
                bw_up[idx] += vm.avg_bw_up;
                bw_down[idx] += vm.avg_bw_down;
                cr[idx] += vm.cr;
            }
        }
        let bw_up_sum: f64 = bw_up.iter().sum();
        let bw_down_sum: f64 = bw_down.iter().sum();
        let cr_sum: f64 = cr.iter().sum();

        for task_type in TaskType::ALL {
            let idx = task_type.index();
            let demand = &snapshot.demand[idx];
            if bw_up[idx] < demand.t_up * self.theta
                || bw_down[idx] < demand.t_down * self.theta
                || cr[idx] < demand.cr * self.theta
            {
                return false;
            }
        }
        self.contract.bw_low <= bw_up_sum.min(bw_down_sum)
            && bw_up_sum.max(bw_down_sum) <= self.contract.bw_high
            && self.contract.cr_low <= cr_sum
            && cr_sum <= self.contract.cr_high
    }
}

impl GeneticOptimizing for VmSubsetOptimizing {
    type Genome = Population;
    type Context<'a> = PartitionSnapshot<'a>;

    fn step(
        &mut self,
        snapshot: &PartitionSnapshot<'_>,
        rng: &mut Pcg64,
    ) -> Result<Vec<Population>, SimulationError> {
        if self.populations.is_none() {
            let mut seeds = Vec::with_capacity(self.ga.offspring_number);
            for _ in 0..self.ga.offspring_number {
                seeds.push(self.choose_vms(snapshot, rng)?);
            }
            self.populations = Some(seeds.clone());
            return Ok(seeds);
        }
        // evolve until every offspring is feasible, within the attempt cap
        let mut attempts = 0;
        loop {
            if attempts > self.ga.max_search_attempts {
                warn!("no feasible generation after {} evolution attempts", attempts - 1);
                return Err(SimulationError::SearchExhausted { attempts: attempts - 1 });
            }
            attempts += 1;
            let parents = self.selection(rng);
            let offsprings = self.crossover(parents, rng);
            let offsprings = self.mutation(offsprings, snapshot, rng)?;
            if offsprings
                .iter()
                .all(|offspring| self.check_condition(offspring, snapshot))
            {
                if log_enabled!(Level::Debug) {
                    debug!("feasible generation found after {} attempt(s)", attempts);
                }
                self.populations = Some(offsprings.clone());
                return Ok(offsprings);
            }
        }
    }

    fn selection(&mut self, rng: &mut Pcg64) -> Vec<Population> {
        let populations = self.populations.as_deref().unwrap_or(&[]);
        sus_select(populations, &self.fitness, self.ga.offspring_number, rng)
    }

    fn crossover(&mut self, parents: Vec<Population>, rng: &mut Pcg64) -> Vec<Population> {
        segment_shuffle_crossover(parents, rng)
    }

    fn mutation(
        &mut self,
        mut offsprings: Vec<Population>,
        snapshot: &PartitionSnapshot<'_>,
        rng: &mut Pcg64,
    ) -> Result<Vec<Population>, SimulationError> {
        for offspring in offsprings.iter_mut() {
            if rng.gen::<f64>() < self.ga.mutate_rate {
                // wholesale replacement with a fresh feasible-seeking draw
                *offspring = self.choose_vms(snapshot, rng)?;
            } else {
                for bit in offspring.iter_mut() {
                    if rng.gen::<f64>() < self.ga.mutate_rate {
                        *bit = !*bit;
                    }
                }
            }
        }
        Ok(offsprings)
    }
}

/// Drives the subset GA for a round: scores every offspring by lease cost and
/// keeps the cheapest-for-the-MVNO (highest fitness) partition seen so far.
pub struct VmAssignment {
    pub optimizing: VmSubsetOptimizing,
    /// Sum of origin prices over the whole pool; fitness inverts cost against
    /// it so that higher fitness means a cheaper lease.
    pub highest_price: f64,
    evolution_rounds: usize,
    lambda: f64,
}

impl VmAssignment {
    pub fn new(
        contract: Contract,
        candidate_ids: Vec<VmId>,
        registry: &VmRegistry,
        ga: GaConfig,
        theta: f64,
        lambda: f64,
    ) -> Self {
        let highest_price: f64 = candidate_ids
            .iter()
            .filter_map(|id| registry.get(*id))
            .map(|vm| vm.origin_price)
            .sum();
        let evolution_rounds = ga.evolution_rounds;
        Self {
            optimizing: VmSubsetOptimizing::new(contract, candidate_ids, ga, theta),
            highest_price,
            evolution_rounds,
            lambda,
        }
    }

    /// Lease cost of a population at the MNO->MVNO discount.
    pub fn lease_cost(&self, population: &[bool], registry: &VmRegistry) -> f64 {
        self.optimizing
            .masked_ids(population)
            .iter()
            .filter_map(|id| registry.get(*id))
            .map(|vm| vm.origin_price * self.lambda)
            .sum()
    }

    /// Run the configured number of evolutions and split the candidate ids by
    /// the best population: `(kept by MNO, leased to MVNO)`.
    pub fn run(
        &mut self,
        demand: &DemandMatrix,
        registry: &VmRegistry,
        rng: &mut Pcg64,
    ) -> Result<(Vec<VmId>, Vec<VmId>), SimulationError> {
        let snapshot = PartitionSnapshot { registry, demand };
        for round in 0..self.evolution_rounds {
            let populations = self.optimizing.step(&snapshot, rng)?;
            for (idx, population) in populations.iter().enumerate() {
                let cost = self.lease_cost(population, registry);
                let fitness = self.highest_price - cost;
                self.optimizing.fitness[idx] = fitness;
                if fitness > self.optimizing.best_fitness || self.optimizing.best_population.is_none() {
                    debug!(
                        "evolution {}: better partition found, cost {:.2}, fitness {:.2}",
                        round + 1,
                        cost,
                        fitness
                    );
                    self.optimizing.best_fitness = fitness;
                    self.optimizing.best_population = Some(population.clone());
                }
            }
        }
        let best = self
            .optimizing
            .best_population
            .clone()
            .ok_or(SimulationError::SearchExhausted { attempts: 0 })?;
        let mvno_ids = self.optimizing.masked_ids(&best);
        let inverse: Vec<bool> = best.iter().map(|flag| !flag).collect();
        let mno_ids = self.optimizing.masked_ids(&inverse);
        Ok((mno_ids, mvno_ids))
    }
}
