// src/agents/stakeholder.rs

use super::config::MIN_STAKE_UNIT;
use super::operator::{
    OperatorPolicy, PoolMove, PoolTerms, competitive_margin, liquid_contract_layout,
    tiered_pool_pledge,
};
use super::utility::{cost_per_pool, delegator_utility, improves_on, operator_utility};
use super::view::StakingView;
use crate::pools::{Pool, RankKey};
use crate::types::{AgentId, PoolId, Strategy};
use std::collections::BTreeMap;
use tracing::trace;

/// Which of the three evaluated options an agent settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Keep,
    Delegate,
    Operate,
}

/// Everything one evaluation produced, kept around for logging and tests.
#[derive(Debug, Clone)]
pub struct Decision {
    pub current_utility: f64,
    pub delegator_utility: f64,
    pub operator_utility: Option<f64>,
    pub choice: Choice,
    /// The strategy to commit, `None` when keeping the current one.
    pub strategy: Option<Strategy>,
}

/// A stake holder: owns some stake, pays `cost` per pool it runs, and moves between
/// delegating and operating to maximise its expected utility.
#[derive(Debug, Clone)]
pub struct Stakeholder {
    id: AgentId,
    stake: f64,
    cost: f64,
    is_myopic: bool,
    strategy: Strategy,
    pending: Option<Strategy>,
}

impl Stakeholder {
    pub fn new(id: AgentId, stake: f64, cost: f64) -> Self {
        Self {
            id,
            stake,
            cost,
            is_myopic: false,
            strategy: Strategy::default(),
            pending: None,
        }
    }

    /// Myopic agents take pool sizes at face value instead of anticipating saturation.
    pub fn with_myopia(mut self, is_myopic: bool) -> Self {
        self.is_myopic = is_myopic;
        self
    }

    // === Accessors ===

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn stake(&self) -> f64 {
        self.stake
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn is_myopic(&self) -> bool {
        self.is_myopic
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn pending(&self) -> Option<&Strategy> {
        self.pending.as_ref()
    }

    pub fn owned_pool_ids(&self) -> impl Iterator<Item = PoolId> + '_ {
        self.strategy.owned_pools().keys().copied()
    }

    // === Decision-making ===

    /// Evaluates the current strategy against the best delegation and the best pool layout,
    /// and stores the winner as pending if it differs from what the agent already does.
    /// Returns true when a new strategy is pending.
    pub fn update_strategy(&mut self, view: &StakingView) -> bool {
        let decision = self.decide(view);
        trace!(
            agent = %self.id,
            current = decision.current_utility,
            delegator = decision.delegator_utility,
            operator = ?decision.operator_utility,
            choice = ?decision.choice,
            "evaluated options"
        );
        self.pending = decision.strategy;
        self.pending.is_some()
    }

    /// Scores the three options. Ties go to the earlier one: keep, then delegate, then operate.
    pub fn decide(&self, view: &StakingView) -> Decision {
        let current_utility = self.current_utility(view);

        let delegation = self.find_delegation_move(view);
        let delegator_utility = self.expected_utility(&delegation, view);

        let operation = self.choose_pool_operation(view);
        let operator_utility = operation
            .as_ref()
            .map(|strategy| self.expected_utility(strategy, view));

        let mut best = (Choice::Keep, current_utility, None);
        if improves_on(delegator_utility, best.1) {
            best = (Choice::Delegate, delegator_utility, Some(delegation));
        }
        if let (Some(strategy), Some(utility)) = (operation, operator_utility) {
            if improves_on(utility, best.1) {
                best = (Choice::Operate, utility, Some(strategy));
            }
        }

        let (choice, _, strategy) = best;
        let strategy = strategy.filter(|candidate| *candidate != self.strategy);
        Decision {
            current_utility,
            delegator_utility,
            operator_utility,
            choice,
            strategy,
        }
    }

    /// Utility of what the agent is doing right now, read off the live pools.
    pub fn current_utility(&self, view: &StakingView) -> f64 {
        let owned = self
            .strategy
            .owned_pools()
            .keys()
            .filter_map(|id| view.pool(*id));
        self.utility_of(owned, self.strategy.stake_allocations(), view)
    }

    /// Utility the agent expects from `strategy` if it were committed against the current
    /// state of the system.
    pub fn expected_utility(&self, strategy: &Strategy, view: &StakingView) -> f64 {
        self.utility_of(
            strategy.owned_pools().values(),
            strategy.stake_allocations(),
            view,
        )
    }

    /// Spreads the agent's whole stake over the best-ranked pools it can join, topping each
    /// one up to saturation before moving to the next.
    pub fn find_delegation_move(&self, view: &StakingView) -> Strategy {
        Strategy::delegating(self.delegation_allocations(view, self.stake))
    }

    /// The best pool layout under the run's operator policy, with any stake the layout does
    /// not use delegated. `None` when the agent cannot afford a single pool.
    pub fn choose_pool_operation(&self, view: &StakingView) -> Option<Strategy> {
        match view.rules.policy {
            OperatorPolicy::LiquidContracts => self.plan_liquid_contracts(view),
            OperatorPolicy::FreeMargin => self.plan_free_margin(view),
        }
    }

    // === Scheduler callbacks ===

    pub fn take_pending(&mut self) -> Option<Strategy> {
        self.pending.take()
    }

    /// Installs a committed strategy.
    pub fn adopt(&mut self, strategy: Strategy) {
        self.strategy = strategy;
        self.pending = None;
    }

    /// Forgets any stake placed in `pool`, which someone else just closed or made private.
    pub fn drop_allocation(&mut self, pool: PoolId) {
        self.strategy = self.strategy.without_allocation(pool);
        if let Some(pending) = &self.pending {
            self.pending = Some(pending.without_allocation(pool));
        }
    }

    // === Internals ===

    fn utility_of<'p>(
        &self,
        owned: impl Iterator<Item = &'p Pool>,
        allocations: &BTreeMap<PoolId, f64>,
        view: &StakingView,
    ) -> f64 {
        let owned: Vec<&Pool> = owned.collect();
        let sibling_keys: Vec<RankKey> = owned.iter().map(|pool| RankKey::of(pool)).collect();
        let operating: f64 = owned
            .iter()
            .map(|pool| {
                operator_utility(
                    self.expected_pool_stake(pool, &sibling_keys, view),
                    pool.pledge(),
                    pool.margin(),
                    pool.cost(),
                    view.reward,
                )
            })
            .sum();
        let delegating: f64 = allocations
            .iter()
            .filter_map(|(id, amount)| view.pool(*id).map(|pool| (pool, *amount)))
            .map(|(pool, amount)| self.delegation_payoff(pool, amount, view))
            .sum();
        operating + delegating
    }

    /// Stake an owned pool is expected to end up with. A farsighted operator assumes a public
    /// pool fills up to saturation when it would rank among the top k of the system the
    /// strategy leads to: everyone else's live pools plus every pool in `siblings`.
    fn expected_pool_stake(&self, pool: &Pool, siblings: &[RankKey], view: &StakingView) -> f64 {
        if self.is_myopic || !pool.accepts_delegations() {
            return pool.stake();
        }
        let key = RankKey::of(pool);
        let siblings_ahead = siblings.iter().filter(|sibling| **sibling < key).count();
        if self.others_ahead(&key, view) + siblings_ahead < view.reward.saturated_pool_capacity() {
            pool.stake().max(view.beta())
        } else {
            pool.stake()
        }
    }

    fn delegation_payoff(&self, pool: &Pool, amount: f64, view: &StakingView) -> f64 {
        let projected = pool.stake() - pool.delegation_of(self.id) + amount;
        let pool_stake = if self.is_myopic {
            projected
        } else {
            projected.max(view.beta())
        };
        delegator_utility(amount, pool_stake, pool.pledge(), pool.margin(), view.reward)
    }

    fn delegation_allocations(&self, view: &StakingView, amount: f64) -> BTreeMap<PoolId, f64> {
        let mut allocations = BTreeMap::new();
        if amount < MIN_STAKE_UNIT {
            return allocations;
        }
        let beta = view.beta();
        let mut remaining = amount;
        for pool in view.eligible_pools(self.id) {
            let room = pool.room_to_saturation(beta, self.id);
            if room <= MIN_STAKE_UNIT {
                continue;
            }
            let allocation = room.min(remaining);
            allocations.insert(pool.id(), allocation);
            remaining -= allocation;
            if remaining < MIN_STAKE_UNIT {
                break;
            }
        }
        allocations
    }

    fn live_owned_pools<'v>(&self, view: &StakingView<'v>) -> Vec<&'v Pool> {
        self.strategy
            .owned_pools()
            .keys()
            .filter_map(|id| view.pool(*id))
            .collect()
    }

    fn plan_liquid_contracts(&self, view: &StakingView) -> Option<Strategy> {
        let (terms, stake_left) = liquid_contract_layout(
            self.stake,
            view.reward.min_effective_balance(),
            view.beta(),
            view.rules.max_pools_per_agent,
        );
        if terms.is_empty() {
            return None;
        }
        let cost = cost_per_pool(terms.len(), self.cost, view.rules.extra_pool_cost_fraction);

        // an existing pool is kept whenever the layout asks for one with the same terms
        let mut reusable = self.live_owned_pools(view);
        let layout = terms
            .into_iter()
            .map(|terms| {
                let existing = reusable
                    .iter()
                    .position(|p| terms.matches(p.pledge(), p.margin(), p.is_private()))
                    .map(|i| reusable.remove(i));
                (existing, terms)
            })
            .collect();

        let owned = self.realize_layout(view, layout, cost);
        Some(Strategy::new(owned, self.delegation_allocations(view, stake_left)))
    }

    fn plan_free_margin(&self, view: &StakingView) -> Option<Strategy> {
        let (public, private): (Vec<&Pool>, Vec<&Pool>) = self
            .live_owned_pools(view)
            .into_iter()
            .partition(|pool| !pool.is_private());

        let mut best: Option<(f64, Strategy)> = None;
        for pool_move in PoolMove::MENU {
            let Some((num_public, num_private)) = pool_move.target(public.len(), private.len())
            else {
                continue;
            };
            if num_public + num_private > view.rules.max_pools_per_agent {
                continue;
            }
            let Some(candidate) =
                self.free_margin_layout(view, &public, &private, num_public, num_private)
            else {
                continue;
            };
            let utility = self.expected_utility(&candidate, view);
            if best.as_ref().is_none_or(|(incumbent, _)| improves_on(utility, *incumbent)) {
                best = Some((utility, candidate));
            }
        }
        best.map(|(_, strategy)| strategy)
    }

    /// Public pools pledge the tiered minimum and compete on margin; solo pools split the rest
    /// of the stake evenly, up to `beta` each. Existing pools are kept oldest first, so
    /// shrinking drops the newest. `None` when the stake cannot cover the public pledges.
    fn free_margin_layout(
        &self,
        view: &StakingView,
        public: &[&Pool],
        private: &[&Pool],
        num_public: usize,
        num_private: usize,
    ) -> Option<Strategy> {
        let public_pledge = tiered_pool_pledge(view.reward.min_effective_balance());
        let solo_stake = self.stake - public_pledge * num_public as f64;
        if solo_stake < -MIN_STAKE_UNIT {
            return None;
        }
        let solo_stake = solo_stake.max(0.0);
        let solo_pledge = match num_private {
            0 => 0.0,
            n => (solo_stake / n as f64).min(view.beta()),
        };
        let cost = cost_per_pool(
            num_public + num_private,
            self.cost,
            view.rules.extra_pool_cost_fraction,
        );
        let potential_profit = view.reward.potential_reward(public_pledge) - cost;

        let public_terms = PoolTerms {
            pledge: public_pledge,
            margin: competitive_margin(view, self.id, potential_profit),
            is_private: false,
            insurance: 0.0,
        };
        let solo_terms = PoolTerms {
            pledge: solo_pledge,
            margin: 0.0,
            is_private: true,
            insurance: 0.0,
        };
        let layout = (0..num_public)
            .map(|i| {
                let existing = public.get(i).copied();
                let margin = existing
                    .filter(|pool| self.holds_its_slot(pool, public_pledge, cost, view))
                    .map_or(public_terms.margin, Pool::margin);
                (existing, PoolTerms { margin, ..public_terms })
            })
            .chain((0..num_private).map(|i| (private.get(i).copied(), solo_terms)))
            .collect();

        let owned = self.realize_layout(view, layout, cost);
        let remainder = solo_stake - solo_pledge * num_private as f64;
        Some(Strategy::new(owned, self.delegation_allocations(view, remainder)))
    }

    /// An open public pool keeps its margin while, re-priced with `pledge` and `cost`, it still
    /// ranks among the top k of everyone else's pools.
    fn holds_its_slot(&self, pool: &Pool, pledge: f64, cost: f64, view: &StakingView) -> bool {
        if !pool.accepts_delegations() {
            return false;
        }
        let repriced = Pool::new(pool.id(), self.id, cost, pledge, pool.margin(), false, view.reward);
        self.others_ahead(&RankKey::of(&repriced), view) < view.reward.saturated_pool_capacity()
    }

    /// Live pools of other owners that outrank `key`.
    fn others_ahead(&self, key: &RankKey, view: &StakingView) -> usize {
        view.ranking
            .keys()
            .take_while(|other| *other < key)
            .filter(|other| view.pool(other.id).is_some_and(|p| p.owner() != self.id))
            .count()
    }

    /// Turns a layout into pools: reused pools keep their id and delegations, new ones get
    /// draft ids counting up from `view.next_pool_id`.
    fn realize_layout(
        &self,
        view: &StakingView,
        layout: Vec<(Option<&Pool>, PoolTerms)>,
        cost: f64,
    ) -> BTreeMap<PoolId, Pool> {
        let mut next_draft = view.next_pool_id;
        let mut owned = BTreeMap::new();
        for (existing, terms) in layout {
            let id = match existing {
                Some(pool) => pool.id(),
                None => {
                    let id = next_draft;
                    next_draft = next_draft.next();
                    id
                }
            };
            let draft = Pool::new(
                id,
                self.id,
                cost,
                terms.pledge,
                terms.margin,
                terms.is_private,
                view.reward,
            )
            .with_insurance(terms.insurance);
            let pool = match existing {
                Some(live) => {
                    let mut pool = live.clone();
                    if terms.is_private {
                        pool.clear_delegations();
                    }
                    pool.apply_terms(&draft, view.reward);
                    pool
                }
                None => draft,
            };
            owned.insert(id, pool);
        }
        owned
    }
}
