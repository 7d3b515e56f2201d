//! Runtime generation of user-to-VM reachability: Beta-distributed bandwidth
//! and Pearson-Type-5 delay, both via rejection sampling.

use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::vm::{Location, UserLink};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Pearson5Params {
    pub a: u32,
    pub b: f64,
    pub d: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub beta_a: f64,
    pub beta_b: f64,
    /// Scale of the Beta support, Mbps before the Kbps conversion.
    pub beta_t: f64,
    pub beta_d: f64,
    /// Edge links carry a fraction of the cloud bandwidth.
    pub edge_bw_factor: f64,
    pub pt5_cloud: Pearson5Params,
    pub pt5_edge: Pearson5Params,
    /// Width of the delay sampling window, ms.
    pub pt5_max_x: f64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            beta_a: 2.0,
            beta_b: 1.5,
            beta_t: 4.0,
            beta_d: 0.0,
            edge_bw_factor: 0.6,
            pt5_cloud: Pearson5Params {
                a: 2,
                b: 0.557,
                d: 49.443,
            },
            pt5_edge: Pearson5Params {
                a: 2,
                b: 0.557,
                d: 1.443,
            },
            pt5_max_x: 20.0,
        }
    }
}

impl WorkloadConfig {
    /// Bandwidth draw in Kbps. Rejection sampling against the unnormalized
    /// Beta density; the normalization constant cancels.
    pub fn sample_bandwidth(&self, rng: &mut Pcg64) -> f64 {
        let (a, b, t, d) = (self.beta_a, self.beta_b, self.beta_t, self.beta_d);
        let density = |x: f64| {
            let u = (x - d) / t;
            u.powf(a - 1.0) * (1.0 - u).powf(b - 1.0)
        };
        let mode = (a - 1.0) / (a + b - 2.0);
        let max_val = density(mode * t + d);
        loop {
            let x = rng.gen_range(d..d + t);
            let y = rng.gen_range(0.0..max_val);
            if y <= density(x) {
                return x * 1000.0;
            }
        }
    }

    /// Delay draw in milliseconds.
    pub fn sample_delay(&self, location: Location, rng: &mut Pcg64) -> f64 {
        let params = match location {
            Location::Cloud => self.pt5_cloud,
            Location::Edge => self.pt5_edge,
        };
        let a = params.a as f64;
        let density = |x: f64| {
            let shifted = x - params.d;
            shifted.powf(-(a - 1.0)) * (-params.b / shifted).exp()
        };
        let mode = params.b / (a + 1.0) + params.d;
        let max_val = density(mode);
        loop {
            let x = rng.gen_range(params.d..params.d + self.pt5_max_x);
            if x <= params.d {
                continue;
            }
            let y = rng.gen_range(0.0..max_val);
            if y <= density(x) {
                return x;
            }
        }
    }

    /// Fresh reachability data from one user to one VM.
    pub fn generate_user_link(&self, location: Location, rng: &mut Pcg64) -> UserLink {
        let bw_factor = match location {
            Location::Cloud => 1.0,
            Location::Edge => self.edge_bw_factor,
        };
        UserLink {
            bw_up: self.sample_bandwidth(rng) * bw_factor,
            bw_down: self.sample_bandwidth(rng) * bw_factor,
            delay: self.sample_delay(location, rng),
        }
    }
}
