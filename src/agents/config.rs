// src/agents/config.rs

//! A centralized place for the constants the decision engine is tuned with.

// --- Rewards ---
/// Total reward handed out per epoch, before normalisation by total stake.
pub const TOTAL_EPOCH_REWARDS_R: f64 = 1.0;

// --- Stake accounting ---
/// Anything smaller is dust: delegations below it are dropped and stake below it is not worth moving.
pub const MIN_STAKE_UNIT: f64 = 2.2e-17;

// --- Operator behaviour ---
/// Hard cap on the number of pools one agent may run.
pub const MAX_NUM_POOLS: usize = 1000;
/// Margin an operator charges when no competitor stands between it and the top of the ranking.
pub const DEFAULT_MAX_MARGIN: f64 = 0.2;
/// How far below the break-even margin a free-margin operator undercuts its competitor.
/// Each undercut costs at least this much margin, so price wars end in a bounded number of steps.
pub const MARGIN_INCREMENT: f64 = 0.01;
/// Default share of an operator's base cost that every additional pool adds.
pub const EXTRA_POOL_COST_FRACTION: f64 = 0.4;

// --- Decisions & convergence ---
/// Consecutive no-change steps before the population is considered settled.
pub const IDLE_STEPS_FOR_CONVERGENCE: u32 = 11;
/// Absolute amount by which a new strategy must beat the current one before an agent switches.
/// Utilities are fractions of a unit epoch reward, so this sits just above accumulated f64 noise.
pub const UTILITY_TOLERANCE: f64 = 1e-12;
