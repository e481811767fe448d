// src/agents/utility.rs

//! Per-pool payoff math shared by every move the decision engine evaluates.

use crate::rewards::RewardFunction;

/// What the operator takes home from a pool holding `pool_stake`: its margin on the reward plus
/// its pledge share of the remainder, minus the full operating cost.
pub fn operator_utility(
    pool_stake: f64,
    pledge: f64,
    margin: f64,
    cost: f64,
    reward: &RewardFunction,
) -> f64 {
    if pool_stake <= 0.0 {
        return -cost;
    }
    let r = reward.reward(pool_stake, pledge);
    r * (margin + (1.0 - margin) * pledge / pool_stake) - cost
}

/// What a delegator earns from `allocation` in a pool holding `pool_stake` after the move.
pub fn delegator_utility(
    allocation: f64,
    pool_stake: f64,
    pledge: f64,
    margin: f64,
    reward: &RewardFunction,
) -> f64 {
    if pool_stake <= 0.0 {
        return 0.0;
    }
    let r = reward.reward(pool_stake, pledge);
    r * (1.0 - margin) * allocation / pool_stake
}

/// Average per-pool cost of running `num_pools` pools when every pool past the first adds
/// `extra_fraction` of the base cost.
pub fn cost_per_pool(num_pools: usize, base_cost: f64, extra_fraction: f64) -> f64 {
    if num_pools == 0 {
        return base_cost;
    }
    let n = num_pools as f64;
    (base_cost + (n - 1.0) * extra_fraction * base_cost) / n
}

/// Whether `candidate` beats `incumbent` by more than float noise. The tolerance is absolute,
/// so any real gain counts no matter how large both utilities are.
pub fn improves_on(candidate: f64, incumbent: f64) -> bool {
    candidate - incumbent > super::config::UTILITY_TOLERANCE
}
