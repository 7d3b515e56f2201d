use serde::{Deserialize, Serialize};

use crate::vm::{Location, TaskType};

/// Thresholds of the resource-to-utility mappings. All values are injectable
/// through the simulation config; defaults follow the reference scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityThresholds {
    pub max_score: f64,
    /// Maximum acceptable VM price for the linear price score.
    pub max_price: f64,
    pub voip_bw_up_min: f64,
    pub voip_bw_down_min: f64,
    pub ip_video_bw_up_min: f64,
    pub ip_video_bw_up_max: f64,
    pub ip_video_bw_down_min: f64,
    pub ip_video_bw_down_max: f64,
    pub ftp_bw_up_max: f64,
    pub ftp_bw_down_max: f64,
    /// Exponential decay base and baseline delay per location.
    pub cloud_delay_base: f64,
    pub cloud_delay_baseline: f64,
    pub edge_delay_base: f64,
    pub edge_delay_baseline: f64,
}

impl Default for UtilityThresholds {
    fn default() -> Self {
        Self {
            max_score: 100.0,
            max_price: 250.0,
            voip_bw_up_min: 64.0,
            voip_bw_down_min: 5.0,
            ip_video_bw_up_min: 5.0,
            ip_video_bw_up_max: 50.0,
            ip_video_bw_down_min: 24.0,
            ip_video_bw_down_max: 5000.0,
            ftp_bw_up_max: 50.0,
            ftp_bw_down_max: 5000.0,
            cloud_delay_base: 1.05,
            cloud_delay_baseline: 50.0,
            edge_delay_base: 1.25,
            edge_delay_baseline: 2.0,
        }
    }
}

impl UtilityThresholds {
    pub fn bw_up(&self, task_type: TaskType, bw: f64) -> f64 {
        match task_type {
            TaskType::Voip => self.step(bw, self.voip_bw_up_min),
            TaskType::IpVideo => self.log_ratio(bw, self.ip_video_bw_up_min, self.ip_video_bw_up_max),
            TaskType::Ftp => self.log_cap(bw, self.ftp_bw_up_max),
        }
    }

    pub fn bw_down(&self, task_type: TaskType, bw: f64) -> f64 {
        match task_type {
            TaskType::Voip => self.step(bw, self.voip_bw_down_min),
            TaskType::IpVideo => self.log_ratio(bw, self.ip_video_bw_down_min, self.ip_video_bw_down_max),
            TaskType::Ftp => self.log_cap(bw, self.ftp_bw_down_max),
        }
    }

    /// Linear decrease toward the maximum acceptable price. Goes negative
    /// above it; the placement engine clips aggregated utility instead.
    pub fn price(&self, price: f64) -> f64 {
        self.max_score * (self.max_price - price) / self.max_price
    }

    /// Exponential decay in delay relative to the location baseline.
    pub fn delay(&self, delay: f64, location: Location) -> f64 {
        let (base, baseline) = match location {
            Location::Cloud => (self.cloud_delay_base, self.cloud_delay_baseline),
            Location::Edge => (self.edge_delay_base, self.edge_delay_baseline),
        };
        (self.max_score * base.powf(baseline - delay)).clamp(0.0, self.max_score)
    }

    /// Linear scaling of a compute amount in [0, 1].
    pub fn cr(&self, cr: f64) -> f64 {
        self.max_score * cr
    }

    /// Linear scaling of |requested - available| compute.
    pub fn cr_diff(&self, diff: f64) -> f64 {
        self.max_score * (1.0 - diff)
    }

    /// Hard step: full score at or above the floor, zero below.
    fn step(&self, bw: f64, floor: f64) -> f64 {
        if bw >= floor {
            self.max_score
        } else {
            0.0
        }
    }

    /// Log-ratio curve between floor and ceiling, zero below the floor,
    /// clipped at the ceiling.
    fn log_ratio(&self, bw: f64, floor: f64, ceiling: f64) -> f64 {
        if bw < floor {
            return 0.0;
        }
        let bw = bw.min(ceiling);
        self.max_score * (bw / floor).log10() / (ceiling / floor).log10()
    }

    /// FTP-style curve: log growth from zero, clipped at the ceiling.
    fn log_cap(&self, bw: f64, ceiling: f64) -> f64 {
        let bw = bw.clamp(0.0, ceiling);
        self.max_score * (bw + 1.0).log10() / (ceiling + 1.0).log10()
    }
}

/// Numerically stable softmax, used to decode deployment-parameter genomes.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|value| (value - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|value| value / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voip_bandwidth_is_a_step() {
        let scores = UtilityThresholds::default();
        assert_eq!(scores.bw_up(TaskType::Voip, 63.9), 0.0);
        assert_eq!(scores.bw_up(TaskType::Voip, 64.0), 100.0);
        assert_eq!(scores.bw_up(TaskType::Voip, 5000.0), 100.0);
    }

    #[test]
    fn ip_video_log_ratio_bounds() {
        let scores = UtilityThresholds::default();
        assert_eq!(scores.bw_down(TaskType::IpVideo, 10.0), 0.0);
        assert!(scores.bw_down(TaskType::IpVideo, 24.0).abs() < 1e-9);
        let mid = scores.bw_down(TaskType::IpVideo, 500.0);
        assert!(mid > 0.0 && mid < 100.0);
        // clipped at the ceiling
        assert!((scores.bw_down(TaskType::IpVideo, 1e9) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ftp_curve_monotone() {
        let scores = UtilityThresholds::default();
        let low = scores.bw_up(TaskType::Ftp, 1.0);
        let high = scores.bw_up(TaskType::Ftp, 40.0);
        assert!(low < high);
        assert!((scores.bw_up(TaskType::Ftp, 50.0) - 100.0).abs() < 1e-9);
        assert!((scores.bw_up(TaskType::Ftp, 500.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn delay_decays_with_distance() {
        let scores = UtilityThresholds::default();
        let near = scores.delay(10.0, Location::Cloud);
        let far = scores.delay(80.0, Location::Cloud);
        assert!(near > far);
        assert!(near <= 100.0 && far >= 0.0);
        // edge baseline is much tighter than cloud
        assert!(scores.delay(10.0, Location::Edge) < near);
    }

    #[test]
    fn softmax_sums_to_one() {
        let out = softmax(&[0.1, 2.0, -1.0, 0.5]);
        assert!((out.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(out.iter().all(|p| *p > 0.0));
    }
}
