// src/agents/operator.rs

//! How an agent that decides to operate lays out its pools.

use super::config::{
    DEFAULT_MAX_MARGIN, EXTRA_POOL_COST_FRACTION, MARGIN_INCREMENT, MAX_NUM_POOLS, MIN_STAKE_UNIT,
};
use super::view::StakingView;
use crate::pools::contract_catalog;
use crate::types::AgentId;
use serde::{Deserialize, Serialize};

/// Which family of pool layouts operators pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OperatorPolicy {
    /// Fill the fixed contract catalog greedily, solo pools first.
    #[default]
    LiquidContracts,
    /// Pick the pool count from a small menu and set margins against the competition.
    FreeMargin,
}

/// Knobs shared by every operator decision in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRules {
    pub policy: OperatorPolicy,
    pub extra_pool_cost_fraction: f64,
    pub max_margin: f64,
    pub margin_boost: f64,
    pub max_pools_per_agent: usize,
}

impl Default for OperatorRules {
    fn default() -> Self {
        Self {
            policy: OperatorPolicy::default(),
            extra_pool_cost_fraction: EXTRA_POOL_COST_FRACTION,
            max_margin: DEFAULT_MAX_MARGIN,
            margin_boost: MARGIN_INCREMENT,
            max_pools_per_agent: MAX_NUM_POOLS,
        }
    }
}

/// Owner-controlled attributes of one pool in a layout, before it gets an id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolTerms {
    pub pledge: f64,
    pub margin: f64,
    pub is_private: bool,
    pub insurance: f64,
}

impl PoolTerms {
    /// True when an existing pool can carry these terms without being reopened.
    pub fn matches(&self, pledge: f64, margin: f64, is_private: bool) -> bool {
        self.pledge == pledge && self.margin == margin && self.is_private == is_private
    }
}

/// Greedy walk of the contract catalog for an agent holding `stake`.
///
/// Solo pools come first while the stake covers the minimum effective balance, each pledging
/// up to `beta`. Each remaining tier then takes as many pools as its stake requirement allows.
/// Whatever is left over is not part of the layout.
pub fn liquid_contract_layout(
    stake: f64,
    min_effective_balance: f64,
    beta: f64,
    max_pools: usize,
) -> (Vec<PoolTerms>, f64) {
    let catalog = contract_catalog();
    let mut layout = Vec::new();
    let mut stake_left = stake;

    let solo_requirement = catalog[0].stake_requirement(min_effective_balance).max(MIN_STAKE_UNIT);
    while stake_left >= solo_requirement && layout.len() < max_pools {
        let pledge = stake_left.min(beta);
        stake_left -= pledge;
        layout.push(PoolTerms {
            pledge,
            margin: catalog[0].margin,
            is_private: true,
            insurance: 0.0,
        });
    }

    let last_min_pledge = catalog
        .last()
        .map(|tier| tier.min_pledge(min_effective_balance))
        .unwrap_or(0.0);
    'tiers: for tier in catalog.iter().skip(1) {
        let requirement = tier.stake_requirement(min_effective_balance);
        if requirement < MIN_STAKE_UNIT {
            continue;
        }
        while stake_left >= requirement {
            if layout.len() >= max_pools {
                break 'tiers;
            }
            stake_left -= requirement;
            layout.push(PoolTerms {
                pledge: tier.min_pledge(min_effective_balance),
                margin: tier.margin,
                is_private: tier.is_private(),
                insurance: tier.insurance(min_effective_balance),
            });
            if stake_left < last_min_pledge {
                break 'tiers;
            }
        }
    }

    (layout, stake_left.max(0.0))
}

/// Pledge of a free-margin public pool: the smallest minimum pledge any catalog tier asks for.
/// Stake pledged beyond that earns more in a solo pool, so public pools carry no more.
pub fn tiered_pool_pledge(min_effective_balance: f64) -> f64 {
    contract_catalog()
        .iter()
        .map(|tier| tier.min_pledge(min_effective_balance))
        .fold(f64::INFINITY, f64::min)
}

/// One entry of the free-margin menu, applied to the agent's current pool counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMove {
    /// Keep the pools, only re-tune margins.
    MarginOnly,
    AddPublic(usize),
    AddPrivate(usize),
    /// Close the newest public pool, or the newest private one if there is no public pool.
    RemoveOne,
}

impl PoolMove {
    pub const MENU: [PoolMove; 5] = [
        PoolMove::MarginOnly,
        PoolMove::AddPublic(1),
        PoolMove::AddPublic(2),
        PoolMove::AddPrivate(1),
        PoolMove::RemoveOne,
    ];

    /// `(public, private)` counts after the move, or `None` when the move does not apply.
    pub fn target(self, public: usize, private: usize) -> Option<(usize, usize)> {
        let (public, private) = match self {
            PoolMove::MarginOnly if public + private == 0 => return None,
            PoolMove::MarginOnly => (public, private),
            PoolMove::AddPublic(n) => (public + n, private),
            PoolMove::AddPrivate(n) => (public, private + n),
            PoolMove::RemoveOne if public > 0 => (public - 1, private),
            PoolMove::RemoveOne if private > 0 => (public, private - 1),
            PoolMove::RemoveOne => return None,
        };
        (public + private > 0).then_some((public, private))
    }
}

/// Margin that puts a public pool just ahead of the k-th best competitor, where k is the
/// number of saturated pools the system can hold. The undercut is at least `margin_boost`.
pub fn competitive_margin(view: &StakingView, agent: AgentId, potential_profit: f64) -> f64 {
    let rules = view.rules;
    if potential_profit <= 0.0 {
        return 0.0;
    }
    let k = view.reward.saturated_pool_capacity();
    match view.eligible_pools(agent).nth(k - 1) {
        None => rules.max_margin,
        Some(competitor) => (1.0 - competitor.desirability() / potential_profit - rules.margin_boost)
            .clamp(0.0, rules.max_margin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_solo_then_tiers() {
        // Arrange: 70 units against a 32 minimum balance, beta 32
        // Act
        let (layout, left) = liquid_contract_layout(70.0, 32.0, 32.0, MAX_NUM_POOLS);

        // Assert: two solo pools, then 6 left which no tier can cover
        assert_eq!(layout.len(), 2, "Two solo pools fit.");
        assert!(layout.iter().all(|t| t.is_private && t.margin == 0.0));
        assert!((left - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_layout_falls_back_to_contract_tiers() {
        let (layout, left) = liquid_contract_layout(30.0, 32.0, 32.0, MAX_NUM_POOLS);

        // 30 < 32 so no solo pool; tier 1 (24.8) fits once, leaving 5.2 < 8 (last min pledge)
        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].margin, 0.05);
        assert_eq!(layout[0].pledge, 24.0);
        assert!((layout[0].insurance - 0.8).abs() < 1e-9);
        assert!((left - 5.2).abs() < 1e-9);
    }

    #[test]
    fn test_layout_empty_below_every_requirement() {
        let (layout, left) = liquid_contract_layout(5.0, 32.0, 32.0, MAX_NUM_POOLS);

        assert!(layout.is_empty());
        assert_eq!(left, 5.0);
    }

    #[test]
    fn test_layout_respects_pool_cap() {
        let (layout, _) = liquid_contract_layout(1000.0, 32.0, 32.0, 3);

        assert_eq!(layout.len(), 3);
    }

    #[test]
    fn test_tiered_pool_pledge_is_cheapest_tier() {
        assert!((tiered_pool_pledge(32.0) - 8.0).abs() < 1e-12);
        assert!((tiered_pool_pledge(0.01) - 0.0025).abs() < 1e-15);
    }

    #[test]
    fn test_menu_targets() {
        assert_eq!(PoolMove::MarginOnly.target(0, 0), None);
        assert_eq!(PoolMove::MarginOnly.target(1, 1), Some((1, 1)));
        assert_eq!(PoolMove::AddPublic(2).target(0, 0), Some((2, 0)));
        assert_eq!(PoolMove::AddPrivate(1).target(1, 0), Some((1, 1)));
        assert_eq!(PoolMove::RemoveOne.target(1, 1), Some((0, 1)));
        assert_eq!(PoolMove::RemoveOne.target(0, 2), Some((0, 1)));
        assert_eq!(PoolMove::RemoveOne.target(1, 0), None, "Removing the last pool is not a pool move.");
    }
}
