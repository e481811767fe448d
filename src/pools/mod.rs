// src/pools/mod.rs

pub mod contract;
pub mod pool;
pub mod ranking;

pub use contract::{LiquidContract, contract_catalog};
pub use pool::Pool;
pub use ranking::{PoolRanking, RankKey};
