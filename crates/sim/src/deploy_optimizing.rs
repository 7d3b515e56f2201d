//! Genetic search over deployment parameters: the gamma weight matrix and the
//! operating floors. Offspring genomes score candidate VMs virtually during
//! deployment; the engine adopts the best genome at period end.

use log::debug;
use rand::Rng;
use rand_pcg::Pcg64;

use crate::config::DeployGaConfig;
use crate::error::SimulationError;
use crate::genetic::{segment_shuffle_crossover, sus_select, GeneticOptimizing};
use crate::utility::softmax;

/// Live parameters of the placement utility: per-type weights over
/// {bw_up, bw_down, price, delay} plus the operating floors.
#[derive(Clone, Debug)]
pub struct DeployParams {
    pub gamma: [[f64; 4]; 3],
    pub op_bw: f64,
    pub op_cr: f64,
}

impl DeployParams {
    /// Weighted utility of one candidate, normalized by the weight sum.
    pub fn utility(&self, task_type_idx: usize, scores: &[f64; 4]) -> f64 {
        let weights = &self.gamma[task_type_idx];
        let total: f64 = weights.iter().sum();
        if total == 0.0 {
            return 0.0;
        }
        weights.iter().zip(scores).map(|(w, s)| w * s).sum::<f64>() / total
    }
}

/// Genome layout: 12 gamma genes (3 types x 4 criteria, decoded through
/// per-type softmax) followed by the two operating-floor genes.
const GAMMA_GENES: usize = 12;
const GENOME_LEN: usize = GAMMA_GENES + 2;

pub struct DeployParamsOptimizing {
    cfg: DeployGaConfig,
    populations: Vec<Vec<f64>>,
    pub fitness: Vec<f64>,
    period_utility: Vec<f64>,
    pub best_params: DeployParams,
    pub best_fitness: f64,
}

impl DeployParamsOptimizing {
    pub fn new(initial: DeployParams, cfg: DeployGaConfig, rng: &mut Pcg64) -> Self {
        let populations = (0..cfg.offspring_number).map(|_| random_genome(rng)).collect();
        Self {
            fitness: vec![0.0; cfg.offspring_number],
            period_utility: vec![0.0; cfg.offspring_number],
            populations,
            cfg,
            best_params: initial,
            best_fitness: 0.0,
        }
    }

    pub fn offspring_count(&self) -> usize {
        self.cfg.offspring_number
    }

    pub fn decode(&self, genome: &[f64]) -> DeployParams {
        let mut gamma = [[0.0; 4]; 3];
        for (row, chunk) in gamma.iter_mut().zip(genome[..GAMMA_GENES].chunks(4)) {
            row.copy_from_slice(&softmax(chunk));
        }
        DeployParams {
            gamma,
            op_bw: genome[GAMMA_GENES].clamp(0.0, 1.0) * self.cfg.op_bw_scale,
            op_cr: genome[GAMMA_GENES + 1].clamp(0.0, 1.0) * self.cfg.op_cr_scale,
        }
    }

    pub fn decoded_offsprings(&self) -> Vec<DeployParams> {
        self.populations.iter().map(|genome| self.decode(genome)).collect()
    }

    pub fn reset_period(&mut self) {
        self.period_utility.iter_mut().for_each(|utility| *utility = 0.0);
    }

    /// Accumulate one task's best virtual utility for an offspring.
    pub fn add_virtual_utility(&mut self, offspring: usize, utility: f64) {
        self.period_utility[offspring] += utility.max(0.0);
    }

    /// Average the period utilities into fitness, adopt a better offspring as
    /// the live parameters, and evolve the next generation.
    pub fn update_parameters(&mut self, task_count: u32, rng: &mut Pcg64) {
        let divisor = task_count.max(1) as f64;
        for (fitness, utility) in self.fitness.iter_mut().zip(&self.period_utility) {
            *fitness = utility / divisor;
        }
        let best_idx = self
            .fitness
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx);
        if let Some(idx) = best_idx {
            if self.fitness[idx] > self.best_fitness {
                self.best_fitness = self.fitness[idx];
                self.best_params = self.decode(&self.populations[idx]);
                debug!(
                    "deployment parameters updated, offspring {} with fitness {:.3}",
                    idx + 1,
                    self.best_fitness
                );
            }
        }
        // infallible for this genome type
        let _ = self.step(&(), rng);
    }
}

fn random_genome(rng: &mut Pcg64) -> Vec<f64> {
    let mut genome: Vec<f64> = (0..GAMMA_GENES).map(|_| rng.gen_range(-1.0..1.0)).collect();
    genome.push(rng.gen_range(0.0..1.0));
    genome.push(rng.gen_range(0.0..1.0));
    genome
}

impl GeneticOptimizing for DeployParamsOptimizing {
    type Genome = Vec<f64>;
    type Context<'a> = ();

    fn step(&mut self, _ctx: &(), rng: &mut Pcg64) -> Result<Vec<Vec<f64>>, SimulationError> {
        let parents = self.selection(rng);
        let offsprings = self.crossover(parents, rng);
        let offsprings = self.mutation(offsprings, &(), rng)?;
        self.populations = offsprings.clone();
        Ok(offsprings)
    }

    fn selection(&mut self, rng: &mut Pcg64) -> Vec<Vec<f64>> {
        sus_select(&self.populations, &self.fitness, self.cfg.offspring_number, rng)
    }

    fn crossover(&mut self, parents: Vec<Vec<f64>>, rng: &mut Pcg64) -> Vec<Vec<f64>> {
        segment_shuffle_crossover(parents, rng)
    }

    fn mutation(
        &mut self,
        mut offsprings: Vec<Vec<f64>>,
        _ctx: &(),
        rng: &mut Pcg64,
    ) -> Result<Vec<Vec<f64>>, SimulationError> {
        for offspring in offsprings.iter_mut() {
            if rng.gen::<f64>() < self.cfg.mutate_rate {
                *offspring = random_genome(rng);
            } else {
                for gene in offspring.iter_mut() {
                    if rng.gen::<f64>() < self.cfg.mutate_rate {
                        *gene += rng.gen_range(-self.cfg.perturbation..self.cfg.perturbation);
                    }
                }
            }
        }
        Ok(offsprings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn initial() -> DeployParams {
        DeployParams {
            gamma: [[0.25; 4]; 3],
            op_bw: 300.0,
            op_cr: 0.05,
        }
    }

    #[test]
    fn decode_gamma_rows_sum_to_one() {
        let mut rng = Pcg64::seed_from_u64(11);
        let opt = DeployParamsOptimizing::new(initial(), DeployGaConfig::default(), &mut rng);
        let params = opt.decode(&random_genome(&mut rng));
        for row in params.gamma {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        assert!(params.op_bw >= 0.0 && params.op_bw <= 600.0);
        assert!(params.op_cr >= 0.0 && params.op_cr <= 0.2);
    }

    #[test]
    fn better_offspring_becomes_live_params() {
        let mut rng = Pcg64::seed_from_u64(11);
        let mut opt = DeployParamsOptimizing::new(initial(), DeployGaConfig::default(), &mut rng);
        opt.reset_period();
        opt.add_virtual_utility(2, 90.0);
        opt.add_virtual_utility(2, 70.0);
        let before = opt.decode(&opt.populations[2].clone());
        opt.update_parameters(2, &mut rng);
        assert!((opt.best_fitness - 80.0).abs() < 1e-9);
        assert_eq!(opt.best_params.gamma, before.gamma);
    }

    #[test]
    fn negative_virtual_utility_is_floored() {
        let mut rng = Pcg64::seed_from_u64(11);
        let mut opt = DeployParamsOptimizing::new(initial(), DeployGaConfig::default(), &mut rng);
        opt.reset_period();
        opt.add_virtual_utility(0, -55.0);
        assert_eq!(opt.period_utility[0], 0.0);
    }
}
