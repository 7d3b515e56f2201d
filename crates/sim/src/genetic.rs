//! Shared shape of the two genetic searches: the boolean VM-subset GA and the
//! real-valued deployment-parameter GA.

use rand::Rng;
use rand_pcg::Pcg64;

use crate::error::SimulationError;

/// One full generation step plus the three classic operators. `Context`
/// carries whatever external snapshot feasibility checks need (the VM-subset
/// GA reads the registry and the demand matrix; the parameter GA needs
/// nothing).
pub trait GeneticOptimizing {
    type Genome: Clone;
    type Context<'a>;

    /// Produce the next generation of offspring. First call seeds the
    /// populations; later calls run selection, crossover and mutation.
    fn step(
        &mut self,
        ctx: &Self::Context<'_>,
        rng: &mut Pcg64,
    ) -> Result<Vec<Self::Genome>, SimulationError>;

    fn selection(&mut self, rng: &mut Pcg64) -> Vec<Self::Genome>;

    fn crossover(&mut self, parents: Vec<Self::Genome>, rng: &mut Pcg64) -> Vec<Self::Genome>;

    fn mutation(
        &mut self,
        offsprings: Vec<Self::Genome>,
        ctx: &Self::Context<'_>,
        rng: &mut Pcg64,
    ) -> Result<Vec<Self::Genome>, SimulationError>;
}

/// Stochastic universal sampling. The wheel repeats each population
/// `ceil(fitness)` times; `count` evenly spaced pointers start from a random
/// offset in `[0, total_fitness / count)`.
pub fn sus_select<G: Clone>(populations: &[G], fitness: &[f64], count: usize, rng: &mut Pcg64) -> Vec<G> {
    let mut wheel = Vec::new();
    for (genome, fit) in populations.iter().zip(fitness) {
        for _ in 0..fit.max(0.0).ceil() as usize {
            wheel.push(genome);
        }
    }
    if wheel.is_empty() {
        // all-zero fitness: nothing to weight, keep the current generation
        return populations.to_vec();
    }
    let total: f64 = fitness.iter().map(|fit| fit.max(0.0)).sum();
    let pointer_gap = ((total / count as f64).floor() as usize).max(1);
    let start = rng.gen_range(0..pointer_gap);
    (0..count)
        .map(|i| wheel[(start + i * pointer_gap) % wheel.len()].clone())
        .collect()
}

/// Population-wide two-point crossover: pick an inclusive segment and permute
/// which offspring contributes which segment, not pairwise swapping.
pub fn segment_shuffle_crossover<T: Clone>(mut parents: Vec<Vec<T>>, rng: &mut Pcg64) -> Vec<Vec<T>> {
    let min_len = parents.iter().map(|parent| parent.len()).min().unwrap_or(0);
    if min_len == 0 || parents.len() < 2 {
        return parents;
    }
    let a = rng.gen_range(0..min_len);
    let b = rng.gen_range(0..min_len);
    let (left, right) = (a.min(b), a.max(b));

    let mut order: Vec<usize> = (0..parents.len()).collect();
    use rand::seq::SliceRandom;
    order.shuffle(rng);

    let segments: Vec<Vec<T>> = parents
        .iter()
        .map(|parent| parent[left..=right].to_vec())
        .collect();
    for (dst, src) in order.into_iter().enumerate() {
        parents[dst][left..=right].clone_from_slice(&segments[src]);
    }
    parents
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sus_prefers_fit_populations() {
        let mut rng = Pcg64::seed_from_u64(7);
        let populations = vec![vec![true], vec![false]];
        // overwhelming fitness gap: the fit genome must dominate the draw
        let picks = sus_select(&populations, &[1000.0, 1.0], 4, &mut rng);
        assert_eq!(picks.len(), 4);
        assert!(picks.iter().filter(|p| p[0]).count() >= 3);
    }

    #[test]
    fn sus_survives_zero_fitness() {
        let mut rng = Pcg64::seed_from_u64(7);
        let populations = vec![vec![true, false], vec![false, true]];
        let picks = sus_select(&populations, &[0.0, 0.0], 2, &mut rng);
        assert_eq!(picks, populations);
    }

    #[test]
    fn crossover_preserves_multiset_per_column() {
        let mut rng = Pcg64::seed_from_u64(3);
        let parents = vec![vec![0, 0, 0, 0], vec![1, 1, 1, 1], vec![2, 2, 2, 2]];
        let children = segment_shuffle_crossover(parents, &mut rng);
        assert_eq!(children.len(), 3);
        for col in 0..4 {
            let mut column: Vec<i32> = children.iter().map(|child| child[col]).collect();
            column.sort_unstable();
            assert_eq!(column, vec![0, 1, 2]);
        }
    }
}
