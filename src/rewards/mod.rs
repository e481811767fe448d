// src/rewards/mod.rs

pub mod reward_scheme;

pub use reward_scheme::{RewardFunction, RewardParams, RewardScheme};
