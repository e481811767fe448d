// src/types/strategy.rs

use super::ids::PoolId;
use crate::pools::Pool;
use std::collections::BTreeMap;

/// A candidate (or committed) decision: the pools an agent runs and where it delegates.
///
/// Never mutated in place. Committing replaces an agent's strategy wholesale, and the few
/// adjustments the scheduler needs produce a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Strategy {
    owned_pools: BTreeMap<PoolId, Pool>,
    stake_allocations: BTreeMap<PoolId, f64>,
}

impl Strategy {
    pub fn new(owned_pools: BTreeMap<PoolId, Pool>, stake_allocations: BTreeMap<PoolId, f64>) -> Self {
        Self {
            owned_pools,
            stake_allocations,
        }
    }

    pub fn delegating(stake_allocations: BTreeMap<PoolId, f64>) -> Self {
        Self::new(BTreeMap::new(), stake_allocations)
    }

    pub fn operating(owned_pools: BTreeMap<PoolId, Pool>) -> Self {
        Self::new(owned_pools, BTreeMap::new())
    }

    pub fn owned_pools(&self) -> &BTreeMap<PoolId, Pool> {
        &self.owned_pools
    }

    pub fn stake_allocations(&self) -> &BTreeMap<PoolId, f64> {
        &self.stake_allocations
    }

    pub fn owns(&self, id: PoolId) -> bool {
        self.owned_pools.contains_key(&id)
    }

    pub fn allocation_to(&self, id: PoolId) -> f64 {
        self.stake_allocations.get(&id).copied().unwrap_or(0.0)
    }

    pub fn total_delegated(&self) -> f64 {
        self.stake_allocations.values().sum()
    }

    pub fn total_pledged(&self) -> f64 {
        self.owned_pools.values().map(Pool::pledge).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.owned_pools.is_empty() && self.stake_allocations.is_empty()
    }

    /// The same strategy minus its allocation to `id`.
    pub fn without_allocation(&self, id: PoolId) -> Strategy {
        let mut stake_allocations = self.stake_allocations.clone();
        stake_allocations.remove(&id);
        Strategy::new(self.owned_pools.clone(), stake_allocations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::RewardFunction;
    use crate::types::AgentId;

    #[test]
    fn test_without_allocation_leaves_original_untouched() {
        let reward = RewardFunction::ethereum(0.1, 0.2, 1.0).unwrap();
        let pool = Pool::new(PoolId(1), AgentId(0), 0.001, 0.1, 0.1, false, &reward);
        let strategy = Strategy::new(
            BTreeMap::from([(PoolId(1), pool)]),
            BTreeMap::from([(PoolId(2), 0.01), (PoolId(3), 0.02)]),
        );

        let trimmed = strategy.without_allocation(PoolId(2));

        assert_eq!(strategy.stake_allocations().len(), 2);
        assert_eq!(trimmed.allocation_to(PoolId(2)), 0.0);
        assert_eq!(trimmed.allocation_to(PoolId(3)), 0.02);
        assert!(trimmed.owns(PoolId(1)));
        assert!((strategy.total_delegated() - 0.03).abs() < 1e-12);
        assert!((strategy.total_pledged() - 0.1).abs() < 1e-12);
    }
}
