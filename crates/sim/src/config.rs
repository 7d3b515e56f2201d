//! Simulation parameters. Every reward/penalty constant of the decision
//! engines lives here so scenarios can override them from YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::contract::Contract;
use crate::error::SimulationError;
use crate::utility::UtilityThresholds;
use crate::workload::WorkloadConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    /// Populations per generation.
    pub offspring_number: usize,
    pub mutate_rate: f64,
    /// GA generations per partition refresh.
    pub evolution_rounds: usize,
    /// Cap on selection/crossover/mutation loops before the search is
    /// declared exhausted.
    pub max_search_attempts: u32,
    /// Cap on random feasible-seeking draws per `choose_vms` call.
    pub draw_cap: u32,
    /// Expected share of VMs the MNO keeps for itself; the Bernoulli success
    /// probability of a draw is scaled by `1 - mno_rate`.
    pub mno_rate: f64,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            offspring_number: 5,
            mutate_rate: 0.05,
            evolution_rounds: 100,
            max_search_attempts: 1000,
            draw_cap: 1000,
            mno_rate: 0.6,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Reschedules granted before a failing task is dropped.
    pub retry_cap: u32,
    /// Retry offset range in minutes, drawn uniformly.
    pub retry_min: f64,
    pub retry_max: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_cap: 3,
            retry_min: 5.0,
            retry_max: 10.0,
        }
    }
}

/// GA over deployment parameters (gamma weights and operating floors).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployGaConfig {
    pub offspring_number: usize,
    pub mutate_rate: f64,
    /// Magnitude of the uniform gene perturbation on mutation.
    pub perturbation: f64,
    /// Scale mapping the two trailing genes to operating floors.
    pub op_bw_scale: f64,
    pub op_cr_scale: f64,
}

impl Default for DeployGaConfig {
    fn default() -> Self {
        Self {
            offspring_number: 5,
            mutate_rate: 0.05,
            perturbation: 0.3,
            op_bw_scale: 600.0,
            op_cr_scale: 0.2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Small round (one deployment period), minutes.
    pub small_round_minutes: f64,
    /// Big round (one partition refresh), minutes.
    pub big_round_minutes: f64,
    pub big_round_count: u32,
    pub contract: Contract,
    /// Feasibility slack factor applied to demand floors.
    pub theta: f64,
    /// MNO -> MVNO lease discount.
    pub lambda: f64,
    /// MVNO -> end-user markdown.
    pub mu: f64,
    /// Exponential smoothing factor of the rolling demand statistics.
    pub phi: f64,
    /// Probability that a newly seen user subscribes to the MVNO.
    pub mvno_user_rate: f64,
    /// Per-task-type weights over {bw_up, bw_down, price, delay}.
    pub gamma: [[f64; 4]; 3],
    pub mno_op_bw: f64,
    pub mno_op_cr: f64,
    pub mvno_op_bw: f64,
    pub mvno_op_cr: f64,
    /// Floor applied to a period's per-task utility contribution.
    pub utility_floor: f64,
    pub utility: UtilityThresholds,
    pub ga: GaConfig,
    pub deploy_ga: DeployGaConfig,
    pub retry: RetryConfig,
    pub workload: WorkloadConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 1126,
            small_round_minutes: 60.0,
            big_round_minutes: 60.0 * 24.0,
            big_round_count: 7,
            contract: Contract {
                bw_low: 5000.0 * 5.0,
                bw_high: 5000.0 * 80.0,
                cr_low: 5.0,
                cr_high: 80.0,
            },
            theta: 0.25,
            lambda: 0.3,
            mu: 0.7,
            phi: 0.9,
            mvno_user_rate: 0.4,
            gamma: [
                [0.01, 5.0, 1.0, 0.5],
                [0.01, 1.0, 1.0, 0.1],
                [0.01, 3.0, 1.0, 0.01],
            ],
            mno_op_bw: 600.0,
            mno_op_cr: 0.2,
            mvno_op_bw: 300.0,
            mvno_op_cr: 0.05,
            utility_floor: -100.0,
            utility: UtilityThresholds::default(),
            ga: GaConfig::default(),
            deploy_ga: DeployGaConfig::default(),
            retry: RetryConfig::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SimulationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| SimulationError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}
