use crate::models::MIB;

/// Lower bound of every estimate, in seconds.
pub const MIN_ESTIMATE_SECS: u64 = 20;

/// Estimates how long a transfer will hold its queue lease, from the file
/// size and an assumed throughput.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferEstimator {
    /// Assumed throughput in MiB/s. Zero is treated as 1.
    pub throughput_mbps: u64,
    /// Safety margin percentage, capped at 100.
    pub margin_percent: u32,
    /// Count both the source pull and the destination push against the lease.
    pub double_for_round_trip: bool,
    pub penalty_factor: u32,
}

impl Default for TransferEstimator {
    fn default() -> Self {
        Self {
            throughput_mbps: 1,
            margin_percent: 15,
            double_for_round_trip: true,
            penalty_factor: 1,
        }
    }
}

impl TransferEstimator {
    pub fn new(throughput_mbps: u64, margin_percent: u32, double_for_round_trip: bool) -> Self {
        Self {
            throughput_mbps,
            margin_percent,
            double_for_round_trip,
            penalty_factor: 1,
        }
    }

    pub fn with_penalty_factor(mut self, penalty_factor: u32) -> Self {
        self.penalty_factor = penalty_factor;
        self
    }

    /// Estimated seconds, never below [`MIN_ESTIMATE_SECS`].
    ///
    /// The margin term is `margin / (100 * wait)` and shrinks as the base
    /// wait grows.
    pub fn estimate(&self, size_bytes: u64) -> u64 {
        let throughput = self.throughput_mbps.max(1);
        let mut wait = (size_bytes / MIB / throughput) as f64;
        if wait == 0.0 {
            wait = 1.0;
        }
        let margin = f64::from(self.margin_percent.min(100));
        // TODO: confirm with operators whether the margin should scale the
        // wait (`wait * (1 + margin / 100)`) before changing lease lengths.
        wait += margin / (100.0 * wait);

        let mut estimated = wait * f64::from(self.penalty_factor);
        if self.double_for_round_trip {
            estimated *= 2.0;
        }
        (estimated.floor() as u64).max(MIN_ESTIMATE_SECS)
    }
}

/// Shorthand for a one-off estimate with a penalty factor of 1.
pub fn estimate(
    size_bytes: u64,
    throughput_mbps: u64,
    margin_percent: u32,
    double_for_round_trip: bool,
) -> u64 {
    TransferEstimator::new(throughput_mbps, margin_percent, double_for_round_trip)
        .estimate(size_bytes)
}
