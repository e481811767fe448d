// src/agents/view.rs

use super::operator::OperatorRules;
use crate::pools::{Pool, PoolRanking};
use crate::rewards::RewardFunction;
use crate::types::{AgentId, PoolId};
use std::collections::BTreeMap;

/// A read-only snapshot of the staking system given to an agent for decision-making.
pub struct StakingView<'a> {
    pub pools: &'a BTreeMap<PoolId, Pool>,
    pub ranking: &'a PoolRanking,
    pub reward: &'a RewardFunction,
    pub rules: &'a OperatorRules,
    /// First id a pool opened now would get. Drafts are numbered from here.
    pub next_pool_id: PoolId,
}

impl<'a> StakingView<'a> {
    pub fn pool(&self, id: PoolId) -> Option<&'a Pool> {
        self.pools.get(&id)
    }

    pub fn beta(&self) -> f64 {
        self.reward.saturation_threshold()
    }

    /// Live pools in rank order, best first.
    pub fn ranked_pools(&self) -> impl Iterator<Item = &'a Pool> + 'a {
        let pools = self.pools;
        self.ranking.iter().filter_map(move |id| pools.get(&id))
    }

    /// Pools `agent` could delegate to, best first: public, positive margin, owned by someone else.
    pub fn eligible_pools(&self, agent: AgentId) -> impl Iterator<Item = &'a Pool> + 'a {
        self.ranked_pools()
            .filter(move |pool| pool.owner() != agent && pool.accepts_delegations())
    }
}
