// src/lib.rs

// === 1. Declare all the top-level modules ===
pub mod agents;
pub mod error;
pub mod export;
pub mod pools;
pub mod reporters;
pub mod rewards;
pub mod sampling;
pub mod simulation;
pub mod types;

// === 2. Re-export the public-facing components to create a clean API ===

// --- From `agents` ---
pub use agents::{Choice, Decision, OperatorPolicy, OperatorRules, Stakeholder, StakingView};

// --- From `pools` and `rewards` ---
pub use pools::{LiquidContract, Pool, PoolRanking, RankKey, contract_catalog};
pub use rewards::{RewardFunction, RewardParams, RewardScheme};

// --- From our `simulation` engine ---
pub use simulation::{
    ActivationOrder, CommitOutcome, PoolLedger, RunStatus, Simulation, SimulationConfig,
};

// --- From `reporters`, `sampling` and `export` ---
pub use export::export_run;
pub use reporters::{BranchAndBound, PledgeOptimizer, ReportSummary, StepSnapshot};
pub use sampling::{CostDistribution, StakeDistribution};

// --- From `types` and `error` ---
pub use error::{Result, SimulationError};
pub use types::{AgentId, PoolId, Strategy};
