// src/types/ids.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a pool. Assigned from a monotone sequence and never reused within a run,
/// so a lower id always means an older pool.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PoolId(pub u64);

/// Identity of a stakeholder. Doubles as the index into the simulation's agent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl PoolId {
    pub fn next(self) -> Self {
        PoolId(self.0 + 1)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

impl From<u64> for PoolId {
    fn from(id: u64) -> Self {
        PoolId(id)
    }
}

impl From<usize> for AgentId {
    fn from(id: usize) -> Self {
        AgentId(id)
    }
}
