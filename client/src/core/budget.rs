//! Time budget helpers for rounds and sploit instances.

use std::time::Duration;

/// Per-instance time limit for a round.
///
/// The pool runs at most `pool_size` instances at once, so a round needs
/// `ceil(targets / pool_size)` sequential waves. Splitting the period evenly
/// between waves lets every instance get a full slot within one period.
///
/// Returns `None` for an empty roster (the round is skipped) or a zero pool.
pub fn per_instance_deadline(
    period: Duration,
    targets: usize,
    pool_size: usize,
) -> Option<Duration> {
    if targets == 0 || pool_size == 0 {
        return None;
    }
    let waves = targets.div_ceil(pool_size);
    let waves = u32::try_from(waves).unwrap_or(u32::MAX);
    Some(period / waves)
}

/// Longest attack period that still catches each round's flags before they
/// expire on the server.
///
/// A flag lives `flag_lifetime`; the server needs up to `submit_period` to
/// submit it and the client up to `post_period` to post it.
pub fn max_useful_attack_period(
    flag_lifetime: Duration,
    submit_period: Duration,
    post_period: Duration,
) -> Duration {
    flag_lifetime
        .saturating_sub(submit_period)
        .saturating_sub(post_period)
}
