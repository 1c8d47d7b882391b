//! Stake submission policy
//!
//! | fee estimate vs threshold | any minipool past the force line | decision          |
//! |---------------------------|----------------------------------|-------------------|
//! | below (or threshold off)  | -                                | `SubmitAll`       |
//! | at or above               | no                               | `Skip`            |
//! | at or above               | yes                              | `SubmitForced(i)` |

use std::time::Duration;

/// What to do with a batch of stake transactions this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionDecision {
    /// Fees are too high and nothing is urgent; try again next tick
    Skip,
    /// Submit the whole batch at the configured fee cap
    SubmitAll,
    /// Submit only the batch entries at these indices, at the current fee
    SubmitForced(Vec<usize>),
}

/// Whether a minipool that has been in prelaunch for `elapsed` must be staked
/// now. The line is `percent`% of the launch timeout, exclusive.
pub fn must_force(elapsed: Duration, launch_timeout: Duration, percent: u32) -> bool {
    let limit = launch_timeout.as_nanos() * u128::from(percent) / 100;
    elapsed.as_nanos() > limit
}

/// Pick the submission policy for a batch.
///
/// `elapsed` holds, per batch entry, the time its minipool has spent in
/// prelaunch. A `threshold_gwei` of zero disables the fee check.
pub fn submission_decision(
    elapsed: &[Duration],
    launch_timeout: Duration,
    force_percent: u32,
    estimated_gwei: u64,
    threshold_gwei: u64,
) -> SubmissionDecision {
    if threshold_gwei == 0 || estimated_gwei < threshold_gwei {
        return SubmissionDecision::SubmitAll;
    }

    let forced: Vec<usize> = elapsed
        .iter()
        .enumerate()
        .filter(|(_, elapsed)| must_force(**elapsed, launch_timeout, force_percent))
        .map(|(i, _)| i)
        .collect();

    if forced.is_empty() {
        SubmissionDecision::Skip
    } else {
        SubmissionDecision::SubmitForced(forced)
    }
}
