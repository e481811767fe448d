// src/pools/pool.rs

use crate::agents::config::MIN_STAKE_UNIT;
use crate::rewards::RewardFunction;
use crate::types::{AgentId, PoolId};
use std::collections::BTreeMap;

/// A staking pool: the owner's pledge plus whatever other agents delegate to it.
///
/// `stake` is always `pledge + sum(delegators)`. `potential_profit` and `desirability` are
/// cached and refreshed by the mutation methods themselves, so a caller that keeps the pool in
/// a `PoolRanking` must take it out before calling any of them and put it back afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    id: PoolId,
    owner: AgentId,
    cost: f64,
    pledge: f64,
    stake: f64,
    margin: f64,
    is_private: bool,
    insurance: f64,
    delegators: BTreeMap<AgentId, f64>,
    potential_profit: f64,
    desirability: f64,
}

impl Pool {
    pub fn new(
        id: PoolId,
        owner: AgentId,
        cost: f64,
        pledge: f64,
        margin: f64,
        is_private: bool,
        reward: &RewardFunction,
    ) -> Self {
        assert!(pledge >= 0.0, "pledge must be non-negative, got {pledge}");
        assert!(
            (0.0..=1.0).contains(&margin),
            "margin must lie in [0, 1], got {margin}"
        );
        let mut pool = Self {
            id,
            owner,
            cost,
            pledge,
            stake: pledge,
            margin,
            is_private,
            insurance: 0.0,
            delegators: BTreeMap::new(),
            potential_profit: 0.0,
            desirability: 0.0,
        };
        pool.recompute_potential_profit(reward);
        pool
    }

    /// Records stake the owner locked as insurance alongside the pledge.
    pub fn with_insurance(mut self, insurance: f64) -> Self {
        self.insurance = insurance;
        self
    }

    // === Accessors ===

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn owner(&self) -> AgentId {
        self.owner
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn pledge(&self) -> f64 {
        self.pledge
    }

    pub fn stake(&self) -> f64 {
        self.stake
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn insurance(&self) -> f64 {
        self.insurance
    }

    pub fn potential_profit(&self) -> f64 {
        self.potential_profit
    }

    pub fn desirability(&self) -> f64 {
        self.desirability
    }

    pub fn delegators(&self) -> &BTreeMap<AgentId, f64> {
        &self.delegators
    }

    /// What `agent` currently has delegated here (0 if nothing).
    pub fn delegation_of(&self, agent: AgentId) -> f64 {
        self.delegators.get(&agent).copied().unwrap_or(0.0)
    }

    pub fn delegated_stake(&self) -> f64 {
        self.delegators.values().sum()
    }

    /// Whether other agents may delegate here at all.
    pub fn accepts_delegations(&self) -> bool {
        !self.is_private && self.margin > 0.0
    }

    /// Stake still needed to reach saturation, ignoring `excluding`'s own delegation.
    pub fn room_to_saturation(&self, beta: f64, excluding: AgentId) -> f64 {
        beta - (self.stake - self.delegation_of(excluding))
    }

    /// `stake == pledge + sum(delegations)` and no dust entries.
    pub fn is_consistent(&self) -> bool {
        let expected = self.pledge + self.delegated_stake();
        (self.stake - expected).abs() <= 1e-12 * expected.abs().max(1.0)
            && self.delegators.values().all(|amount| *amount >= MIN_STAKE_UNIT)
            && (0.0..=1.0).contains(&self.margin)
    }

    // === Mutation entry points ===

    /// Replaces `delegator`'s contribution with `new_amount`. Amounts below the dust threshold
    /// count as a full withdrawal and remove the entry.
    pub fn update_delegation(&mut self, delegator: AgentId, new_amount: f64) {
        assert!(
            new_amount.is_finite() && new_amount >= 0.0,
            "delegation to {} must be a non-negative amount, got {new_amount}",
            self.id
        );
        if new_amount < MIN_STAKE_UNIT {
            self.delegators.remove(&delegator);
        } else {
            self.delegators.insert(delegator, new_amount);
        }
        self.refresh_stake();
    }

    pub fn set_margin(&mut self, margin: f64) {
        assert!(
            (0.0..=1.0).contains(&margin),
            "margin must lie in [0, 1], got {margin}"
        );
        self.margin = margin;
        self.refresh_desirability();
    }

    /// Potential profit is the saturated reward minus cost. Desirability follows it.
    pub fn recompute_potential_profit(&mut self, reward: &RewardFunction) {
        self.potential_profit = reward.potential_reward(self.pledge) - self.cost;
        self.refresh_desirability();
    }

    /// Copies the owner-controlled terms (cost, pledge, margin, privacy, insurance) from a
    /// draft of the same pool. Delegations are left as they are.
    pub fn apply_terms(&mut self, terms: &Pool, reward: &RewardFunction) {
        assert!(
            (0.0..=1.0).contains(&terms.margin),
            "margin must lie in [0, 1], got {}",
            terms.margin
        );
        self.cost = terms.cost;
        self.pledge = terms.pledge;
        self.margin = terms.margin;
        self.is_private = terms.is_private;
        self.insurance = terms.insurance;
        self.refresh_stake();
        self.recompute_potential_profit(reward);
    }

    /// Zeroes every delegation and returns who was evicted.
    pub(crate) fn clear_delegations(&mut self) -> Vec<AgentId> {
        let evicted: Vec<AgentId> = self.delegators.keys().copied().collect();
        for delegator in &evicted {
            self.update_delegation(*delegator, 0.0);
        }
        evicted
    }

    pub(crate) fn set_id(&mut self, id: PoolId) {
        self.id = id;
    }

    fn refresh_stake(&mut self) {
        // recomputed rather than adjusted by deltas so re-applying an amount is exact
        let stake = self.pledge + self.delegated_stake();
        assert!(stake >= 0.0, "{} would end up with negative stake {stake}", self.id);
        self.stake = stake;
    }

    fn refresh_desirability(&mut self) {
        self.desirability = if !self.is_private && self.potential_profit > 0.0 {
            (1.0 - self.margin) * self.potential_profit
        } else {
            0.0
        };
    }
}
