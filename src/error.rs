// src/error.rs

use crate::types::{AgentId, PoolId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimulationError>;

/// Everything that can go wrong building or running a simulation.
///
/// `UnknownPool` and `NotOwner` are raised from the commit phase and mean an invariant was
/// broken; the run is aborted. Running out of steps is not an error.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("pool {0} is not in the registry")]
    UnknownPool(PoolId),

    #[error("{agent} does not own {pool}")]
    NotOwner { agent: AgentId, pool: PoolId },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("aggregate pledge optimizer unavailable: {0}")]
    OptimizerUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
