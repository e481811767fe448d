// src/simulation/ledger.rs

use crate::agents::config::MIN_STAKE_UNIT;
use crate::agents::{OperatorRules, StakingView};
use crate::error::{Result, SimulationError};
use crate::pools::{Pool, PoolRanking};
use crate::rewards::RewardFunction;
use crate::types::{AgentId, PoolId, Strategy};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What a commit changed beyond the committing agent's own strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    /// The strategy as installed: drafts carry their real ids and every owned pool mirrors
    /// the registry.
    pub strategy: Strategy,
    /// `(delegator, pool)` pairs whose stake was pushed out by a close or a switch to private.
    pub evictions: Vec<(AgentId, PoolId)>,
    /// Pools nobody may delegate to any more (closed or made private).
    pub withdrawn: Vec<PoolId>,
}

/// The live pools, their ranking, and the id sequence. Every pool mutation goes through here
/// so the ranking never holds a stale key.
#[derive(Debug, Clone, Default)]
pub struct PoolLedger {
    pools: BTreeMap<PoolId, Pool>,
    ranking: PoolRanking,
    next_pool_id: PoolId,
    retired: BTreeSet<PoolId>,
}

impl PoolLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pools(&self) -> &BTreeMap<PoolId, Pool> {
        &self.pools
    }

    pub fn pool(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(&id)
    }

    pub fn ranking(&self) -> &PoolRanking {
        &self.ranking
    }

    pub fn next_pool_id(&self) -> PoolId {
        self.next_pool_id
    }

    /// Ids of every pool that has been closed during the run.
    pub fn retired(&self) -> &BTreeSet<PoolId> {
        &self.retired
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn view<'a>(&'a self, reward: &'a RewardFunction, rules: &'a OperatorRules) -> StakingView<'a> {
        StakingView {
            pools: &self.pools,
            ranking: &self.ranking,
            reward,
            rules,
            next_pool_id: self.next_pool_id,
        }
    }

    /// Every pool is internally consistent and the ranking matches the registry.
    pub fn is_consistent(&self) -> bool {
        self.pools.values().all(Pool::is_consistent) && self.ranking.is_fresh(self.pools.values())
    }

    /// Applies `new` in place of `old` for `agent`: withdraw dropped delegations, set the new
    /// ones, close pools no longer owned, update the kept ones, then open the rest under fresh
    /// ids.
    pub fn commit(
        &mut self,
        agent: AgentId,
        old: &Strategy,
        new: Strategy,
        reward: &RewardFunction,
    ) -> Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();

        for id in old.stake_allocations().keys() {
            if !new.stake_allocations().contains_key(id) {
                self.with_pool_mut(*id, |pool| pool.update_delegation(agent, 0.0))?;
            }
        }
        let mut allocations = BTreeMap::new();
        for (id, amount) in new.stake_allocations() {
            self.with_pool_mut(*id, |pool| pool.update_delegation(agent, *amount))?;
            if *amount >= MIN_STAKE_UNIT {
                allocations.insert(*id, *amount);
            }
        }

        for id in old.owned_pools().keys() {
            if !new.owns(*id) {
                self.close(agent, *id, &mut outcome)?;
            }
        }

        let mut owned = BTreeMap::new();
        for (id, draft) in new.owned_pools() {
            let pool = if old.owns(*id) {
                self.update(agent, draft, reward, &mut outcome)?
            } else {
                self.open(agent, draft)
            };
            owned.insert(pool.id(), pool);
        }

        outcome.strategy = Strategy::new(owned, allocations);
        debug_assert!(self.is_consistent(), "ledger inconsistent after commit by {agent}");
        Ok(outcome)
    }

    /// Takes a pool out of the ranking, mutates it, and puts it back under its new key.
    fn with_pool_mut<T>(&mut self, id: PoolId, mutate: impl FnOnce(&mut Pool) -> T) -> Result<T> {
        let pool = self.pools.get_mut(&id).ok_or(SimulationError::UnknownPool(id))?;
        self.ranking.remove(id);
        let result = mutate(pool);
        self.ranking.insert(pool);
        Ok(result)
    }

    fn check_owner(&self, agent: AgentId, id: PoolId) -> Result<()> {
        match self.pools.get(&id) {
            None => Err(SimulationError::UnknownPool(id)),
            Some(pool) if pool.owner() != agent => Err(SimulationError::NotOwner { agent, pool: id }),
            Some(_) => Ok(()),
        }
    }

    fn close(&mut self, agent: AgentId, id: PoolId, outcome: &mut CommitOutcome) -> Result<()> {
        self.check_owner(agent, id)?;
        self.ranking.remove(id);
        let Some(mut pool) = self.pools.remove(&id) else {
            return Err(SimulationError::UnknownPool(id));
        };
        let evicted = pool.clear_delegations();
        debug!(pool = %id, owner = %agent, evicted = evicted.len(), "pool closed");
        outcome
            .evictions
            .extend(evicted.into_iter().map(|delegator| (delegator, id)));
        outcome.withdrawn.push(id);
        self.retired.insert(id);
        Ok(())
    }

    fn update(
        &mut self,
        agent: AgentId,
        draft: &Pool,
        reward: &RewardFunction,
        outcome: &mut CommitOutcome,
    ) -> Result<Pool> {
        let id = draft.id();
        self.check_owner(agent, id)?;
        let (pool, evicted) = self.with_pool_mut(id, |pool| {
            let evicted = if draft.is_private() && !pool.is_private() {
                pool.clear_delegations()
            } else {
                Vec::new()
            };
            pool.apply_terms(draft, reward);
            (pool.clone(), evicted)
        })?;
        if draft.is_private() && !evicted.is_empty() {
            debug!(pool = %id, evicted = evicted.len(), "pool went private");
        }
        if pool.is_private() {
            outcome.withdrawn.push(id);
        }
        outcome
            .evictions
            .extend(evicted.into_iter().map(|delegator| (delegator, id)));
        Ok(pool)
    }

    fn open(&mut self, agent: AgentId, draft: &Pool) -> Pool {
        let id = self.next_pool_id;
        self.next_pool_id = id.next();
        let mut pool = draft.clone();
        pool.set_id(id);
        debug_assert!(pool.delegators().is_empty(), "a new pool starts without delegators");
        debug!(pool = %id, owner = %agent, pledge = pool.pledge(), margin = pool.margin(), "pool opened");
        self.ranking.insert(&pool);
        self.pools.insert(id, pool.clone());
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward() -> RewardFunction {
        RewardFunction::ethereum(0.1, 0.2, 1.0).unwrap()
    }

    fn draft(id: u64, owner: usize, margin: f64, is_private: bool) -> Pool {
        Pool::new(PoolId(id), AgentId(owner), 0.001, 0.1, margin, is_private, &reward())
    }

    fn operating(pools: Vec<Pool>) -> Strategy {
        Strategy::operating(pools.into_iter().map(|p| (p.id(), p)).collect())
    }

    /// Agent 0 runs pool 0, agent 1 delegates 0.05 to it.
    fn ledger_with_delegation() -> (PoolLedger, Strategy, Strategy) {
        let rf = reward();
        let mut ledger = PoolLedger::new();
        let owner = ledger
            .commit(AgentId(0), &Strategy::default(), operating(vec![draft(0, 0, 0.1, false)]), &rf)
            .unwrap()
            .strategy;
        let delegator = ledger
            .commit(
                AgentId(1),
                &Strategy::default(),
                Strategy::delegating(BTreeMap::from([(PoolId(0), 0.05)])),
                &rf,
            )
            .unwrap()
            .strategy;
        (ledger, owner, delegator)
    }

    #[test]
    fn test_fresh_ledger_starts_at_first_id() {
        let ledger = PoolLedger::default();

        assert!(ledger.is_empty());
        assert!(ledger.is_consistent());
        assert_eq!(ledger.next_pool_id(), PoolId(0), "Ids start from the beginning.");
        assert!(ledger.retired().is_empty());
    }

    #[test]
    fn test_open_assigns_fresh_ids() {
        // Arrange: two agents both drafted id 0 against the same state
        let rf = reward();
        let mut ledger = PoolLedger::new();

        // Act
        let first = ledger
            .commit(AgentId(0), &Strategy::default(), operating(vec![draft(0, 0, 0.1, false)]), &rf)
            .unwrap();
        let second = ledger
            .commit(AgentId(1), &Strategy::default(), operating(vec![draft(0, 1, 0.1, false)]), &rf)
            .unwrap();

        // Assert
        assert!(first.strategy.owns(PoolId(0)));
        assert!(second.strategy.owns(PoolId(1)), "The second draft must be re-keyed.");
        assert_eq!(ledger.pool(PoolId(1)).unwrap().owner(), AgentId(1));
        assert_eq!(ledger.next_pool_id(), PoolId(2));
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_delegation_updates_stake_and_rank() {
        let (ledger, _, delegator) = ledger_with_delegation();

        let pool = ledger.pool(PoolId(0)).unwrap();

        assert!((pool.stake() - 0.15).abs() < 1e-12);
        assert_eq!(pool.delegation_of(AgentId(1)), 0.05);
        assert_eq!(delegator.allocation_to(PoolId(0)), 0.05);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_close_evicts_delegators() {
        // Arrange
        let (mut ledger, owner, _) = ledger_with_delegation();

        // Act
        let outcome = ledger.commit(AgentId(0), &owner, Strategy::default(), &reward()).unwrap();

        // Assert
        assert_eq!(outcome.evictions, vec![(AgentId(1), PoolId(0))]);
        assert_eq!(outcome.withdrawn, vec![PoolId(0)]);
        assert!(ledger.is_empty());
        assert!(ledger.retired().contains(&PoolId(0)));
        assert!(ledger.ranking().is_empty());
    }

    #[test]
    fn test_going_private_strips_third_party_stake() {
        let (mut ledger, owner, _) = ledger_with_delegation();

        let outcome = ledger
            .commit(AgentId(0), &owner, operating(vec![draft(0, 0, 0.0, true)]), &reward())
            .unwrap();

        let pool = ledger.pool(PoolId(0)).unwrap();
        assert!(pool.is_private());
        assert_eq!(pool.stake(), pool.pledge(), "A private pool holds only its pledge.");
        assert_eq!(outcome.evictions, vec![(AgentId(1), PoolId(0))]);
        assert_eq!(outcome.strategy.owned_pools()[&PoolId(0)], *pool);
    }

    #[test]
    fn test_withdrawing_delegation() {
        let (mut ledger, _, delegator) = ledger_with_delegation();

        ledger.commit(AgentId(1), &delegator, Strategy::default(), &reward()).unwrap();

        assert_eq!(ledger.pool(PoolId(0)).unwrap().stake(), 0.1);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_unknown_pool_is_an_error() {
        let mut ledger = PoolLedger::new();

        let result = ledger.commit(
            AgentId(0),
            &Strategy::default(),
            Strategy::delegating(BTreeMap::from([(PoolId(9), 0.05)])),
            &reward(),
        );

        assert!(matches!(result, Err(SimulationError::UnknownPool(PoolId(9)))));
    }

    #[test]
    fn test_closing_someone_elses_pool_is_an_error() {
        let (mut ledger, owner, _) = ledger_with_delegation();

        let result = ledger.commit(AgentId(1), &owner, Strategy::default(), &reward());

        assert!(matches!(
            result,
            Err(SimulationError::NotOwner { agent: AgentId(1), pool: PoolId(0) })
        ));
        assert!(ledger.pool(PoolId(0)).is_some(), "A rejected close leaves the pool alone.");
    }

    #[test]
    fn test_recommitting_is_idempotent() {
        let (mut ledger, owner, delegator) = ledger_with_delegation();
        let before = ledger.pools().clone();

        let again = ledger.commit(AgentId(0), &owner, owner.clone(), &reward()).unwrap();
        ledger.commit(AgentId(1), &delegator, delegator.clone(), &reward()).unwrap();

        assert_eq!(*ledger.pools(), before);
        assert!(again.evictions.is_empty());
        assert_eq!(ledger.next_pool_id(), PoolId(1));
    }
}
