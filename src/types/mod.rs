// src/types/mod.rs

pub mod ids;
pub mod strategy;

pub use ids::{AgentId, PoolId};
pub use strategy::Strategy;
