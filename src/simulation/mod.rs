// src/simulation/mod.rs

pub mod activation;
pub mod config;
pub mod engine;
pub mod ledger;

pub use activation::ActivationOrder;
pub use config::SimulationConfig;
pub use engine::{RunStatus, Simulation};
pub use ledger::{CommitOutcome, PoolLedger};
