use serde::{Deserialize, Serialize};

/// Bounds on the aggregate bandwidth and compute rate of the leased VM
/// subset. Immutable for the duration of a round.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Contract {
    /// Lower bound on min(sum bw_up, sum bw_down), Kbps.
    pub bw_low: f64,
    /// Upper bound on max(sum bw_up, sum bw_down), Kbps.
    pub bw_high: f64,
    /// Lower bound on total compute rate.
    pub cr_low: f64,
    /// Upper bound on total compute rate.
    pub cr_high: f64,
}
