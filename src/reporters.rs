// src/reporters.rs

//! Read-only measurements of a run: system-wide reporters, per-step snapshots, and the
//! end-of-run summary.

use crate::agents::Stakeholder;
use crate::error::{Result, SimulationError};
use crate::pools::Pool;
use crate::simulation::{RunStatus, Simulation};
use crate::types::{AgentId, PoolId};
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};
use std::collections::BTreeMap;
use tracing::warn;

/// Reported in place of the minimum aggregate pledge when the optimizer gives up.
pub const MIN_AGGREGATE_PLEDGE_UNAVAILABLE: f64 = -2.0;

// === Helpers ===

fn pools(sim: &Simulation) -> impl Iterator<Item = &Pool> {
    sim.ledger().pools().values()
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.mean() }
}

fn median_or_zero(values: Vec<f64>) -> f64 {
    if values.is_empty() { 0.0 } else { Data::new(values).median() }
}

fn pools_per_owner(sim: &Simulation) -> BTreeMap<AgentId, usize> {
    let mut counts = BTreeMap::new();
    for pool in pools(sim) {
        *counts.entry(pool.owner()).or_insert(0) += 1;
    }
    counts
}

/// Stake of every pool an agent runs, summed per owner. Agents without pools are absent.
fn controlled_stake(sim: &Simulation) -> BTreeMap<AgentId, f64> {
    let mut stake = BTreeMap::new();
    for pool in pools(sim) {
        *stake.entry(pool.owner()).or_insert(0.0) += pool.stake();
    }
    stake
}

/// Half the relative mean absolute difference. 0 for an empty or all-zero sample.
pub fn gini_coefficient(values: &[f64]) -> f64 {
    let n = values.len();
    let total: f64 = values.iter().sum();
    if n < 2 || total <= 0.0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (i as f64 + 1.0) * x)
        .sum();
    let numerator = 2.0 * weighted - (n as f64 + 1.0) * total;
    (numerator / (n as f64 * total)).clamp(0.0, 1.0)
}

// === Pools ===

pub fn pool_count(sim: &Simulation) -> usize {
    sim.ledger().len()
}

pub fn operator_count(sim: &Simulation) -> usize {
    pools_per_owner(sim).len()
}

/// Mean margin over every pool, solo pools included.
pub fn mean_margin(sim: &Simulation) -> f64 {
    let margins: Vec<f64> = pools(sim).map(Pool::margin).collect();
    mean_or_zero(&margins)
}

/// Median over pools that charge a margin at all.
pub fn median_margin(sim: &Simulation) -> f64 {
    median_or_zero(pools(sim).map(Pool::margin).filter(|m| *m != 0.0).collect())
}

/// How many pools run under each non-zero margin, keyed by the margin's display form.
pub fn contract_histogram(sim: &Simulation) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for pool in pools(sim).filter(|p| p.margin() != 0.0) {
        *histogram.entry(format!("{}", pool.margin())).or_insert(0) += 1;
    }
    histogram
}

// === Stake ===

pub fn mean_pledge(sim: &Simulation) -> f64 {
    let pledges: Vec<f64> = pools(sim).map(Pool::pledge).collect();
    mean_or_zero(&pledges)
}

pub fn median_pledge(sim: &Simulation) -> f64 {
    median_or_zero(pools(sim).map(Pool::pledge).collect())
}

pub fn total_pledge(sim: &Simulation) -> f64 {
    pools(sim).map(Pool::pledge).sum()
}

pub fn total_pool_stake(sim: &Simulation) -> f64 {
    pools(sim).map(Pool::stake).sum()
}

/// Pledged share of all stake sitting in pools.
pub fn pledge_rate(sim: &Simulation) -> f64 {
    let active = total_pool_stake(sim);
    if active <= 0.0 { 0.0 } else { total_pledge(sim) / active }
}

pub fn total_delegated(sim: &Simulation) -> f64 {
    pools(sim).map(Pool::delegated_stake).sum()
}

pub fn total_insurance(sim: &Simulation) -> f64 {
    pools(sim).map(Pool::insurance).sum()
}

pub fn total_cost(sim: &Simulation) -> f64 {
    pools(sim).map(Pool::cost).sum()
}

/// Stake that is neither pledged nor delegated.
pub fn unused_stake(sim: &Simulation) -> f64 {
    let held: f64 = sim.agents().iter().map(|a| a.stake()).sum();
    held - total_pledge(sim) - total_delegated(sim)
}

/// Delegated share of pool stake, scaled by how much of it stays liquid.
pub fn liquidity_gain(sim: &Simulation) -> f64 {
    let active = total_pool_stake(sim);
    if active <= 0.0 {
        return 0.0;
    }
    total_delegated(sim) / active * sim.config().liquidity
}

// === Operators ===

pub fn mean_pools_per_operator(sim: &Simulation) -> f64 {
    let operators = operator_count(sim);
    if operators == 0 { 0.0 } else { pool_count(sim) as f64 / operators as f64 }
}

pub fn max_pools_per_operator(sim: &Simulation) -> usize {
    pools_per_owner(sim).values().copied().max().unwrap_or(0)
}

pub fn median_pools_per_operator(sim: &Simulation) -> f64 {
    median_or_zero(pools_per_owner(sim).values().map(|n| *n as f64).collect())
}

/// Operators running more than one pool.
pub fn pool_splitter_count(sim: &Simulation) -> usize {
    pools_per_owner(sim).values().filter(|n| **n > 1).count()
}

/// Agents whose stake, pledged in full to a saturated pool, would cover their cost.
pub fn cost_efficient_count(sim: &Simulation) -> usize {
    sim.agents()
        .iter()
        .filter(|a| sim.reward().potential_reward(a.stake()) - a.cost() > 0.0)
        .count()
}

// === Decentralisation ===

/// Fewest operators that together control more than half the pooled stake. 0 without pools.
pub fn nakamoto_coefficient(sim: &Simulation) -> usize {
    let mut stakes: Vec<f64> = controlled_stake(sim).into_values().collect();
    let total: f64 = stakes.iter().sum();
    if stakes.is_empty() || total <= 0.0 {
        return 0;
    }
    stakes.sort_by(|a, b| b.total_cmp(a));
    let mut cumulative = 0.0;
    for (i, stake) in stakes.iter().enumerate() {
        cumulative += stake;
        if cumulative > total / 2.0 {
            return i + 1;
        }
    }
    stakes.len()
}

/// Total variation distance between the stake agents started with and the stake they
/// control through their pools.
pub fn statistical_distance(sim: &Simulation) -> f64 {
    if sim.ledger().is_empty() {
        return 0.0;
    }
    let controlled = controlled_stake(sim);
    sim.agents()
        .iter()
        .map(|a| (controlled.get(&a.id()).copied().unwrap_or(0.0) - a.stake()).abs())
        .sum::<f64>()
        / 2.0
}

/// Pooled stake relative to every pool being as large as the largest one.
pub fn homogeneity_factor(sim: &Simulation) -> f64 {
    let stakes: Vec<f64> = pools(sim).map(Pool::stake).collect();
    let max = stakes.iter().copied().fold(0.0, f64::max);
    if stakes.is_empty() || max <= 0.0 {
        return 0.0;
    }
    stakes.iter().sum::<f64>() / (stakes.len() as f64 * max)
}

/// Herfindahl-Hirschman index of controlled stake, on the 0..=10000 percentage scale.
pub fn hhi(sim: &Simulation) -> f64 {
    let controlled = controlled_stake(sim);
    let total: f64 = controlled.values().sum();
    if total <= 0.0 {
        return 0.0;
    }
    controlled
        .values()
        .map(|stake| (100.0 * stake / total).powi(2))
        .sum()
}

pub fn gini_pool_count(sim: &Simulation) -> f64 {
    let counts: Vec<f64> = pools_per_owner(sim).values().map(|n| *n as f64).collect();
    gini_coefficient(&counts)
}

pub fn gini_controlled_stake(sim: &Simulation) -> f64 {
    let stakes: Vec<f64> = controlled_stake(sim).into_values().collect();
    gini_coefficient(&stakes)
}

/// Gini of controlled stake over at least k controllers, padding with empty ones. Fewer
/// operators than the system has saturation slots reads as concentration.
pub fn gini_controlled_stake_k_agents(sim: &Simulation) -> f64 {
    let mut stakes: Vec<f64> = controlled_stake(sim).into_values().collect();
    let k = sim.reward().saturated_pool_capacity();
    if stakes.len() < k {
        stakes.resize(k, 0.0);
    }
    gini_coefficient(&stakes)
}

// === Who operates ===

/// 1-based rank of every agent by `score`, highest first. Ties go to the lower id.
fn agent_ranks(sim: &Simulation, score: impl Fn(&Stakeholder) -> f64) -> BTreeMap<AgentId, usize> {
    let mut scored: Vec<(AgentId, f64)> = sim.agents().iter().map(|a| (a.id(), score(a))).collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
        .into_iter()
        .enumerate()
        .map(|(rank, (id, _))| (id, rank + 1))
        .collect()
}

/// The owner's rank for every live pool, so an agent running three pools counts three times.
fn owner_ranks(sim: &Simulation, score: impl Fn(&Stakeholder) -> f64) -> Vec<f64> {
    let ranks = agent_ranks(sim, score);
    pools(sim)
        .filter_map(|pool| ranks.get(&pool.owner()))
        .map(|rank| *rank as f64)
        .collect()
}

/// Rank 1 is the agent with the most stake.
pub fn mean_owner_stake_rank(sim: &Simulation) -> f64 {
    mean_or_zero(&owner_ranks(sim, Stakeholder::stake))
}

pub fn median_owner_stake_rank(sim: &Simulation) -> f64 {
    median_or_zero(owner_ranks(sim, Stakeholder::stake))
}

/// Rank 1 is the agent with the lowest cost.
pub fn mean_owner_cost_rank(sim: &Simulation) -> f64 {
    mean_or_zero(&owner_ranks(sim, |agent| -agent.cost()))
}

pub fn median_owner_cost_rank(sim: &Simulation) -> f64 {
    median_or_zero(owner_ranks(sim, |agent| -agent.cost()))
}

/// How the population's stake is spread, independent of who operates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StakeStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

pub fn stake_distribution_stats(sim: &Simulation) -> StakeStats {
    let stakes: Vec<f64> = sim.agents().iter().map(Stakeholder::stake).collect();
    if stakes.is_empty() {
        return StakeStats::default();
    }
    StakeStats {
        max: Statistics::max(&stakes),
        min: Statistics::min(&stakes),
        mean: Statistics::mean(&stakes),
        std_dev: Statistics::population_std_dev(&stakes),
        median: Data::new(stakes).median(),
    }
}

/// One live pool as a point: its owner's stake against the pool's stake, sized by margin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakePair {
    pub pool: PoolId,
    pub owner_stake: f64,
    pub pool_stake: f64,
    pub margin: f64,
}

pub fn stake_pairs(sim: &Simulation) -> Vec<StakePair> {
    pools(sim)
        .map(|pool| StakePair {
            pool: pool.id(),
            owner_stake: sim.agent(pool.owner()).map_or(0.0, Stakeholder::stake),
            pool_stake: pool.stake(),
            margin: pool.margin(),
        })
        .collect()
}

// === Minimum aggregate pledge ===

/// Finds the smallest total pledge of a set of pools that together hold at least half of
/// all pooled stake.
pub trait PledgeOptimizer {
    /// `pools` holds `(pledge, stake)` pairs.
    fn min_aggregate_pledge(&self, pools: &[(f64, f64)]) -> Result<f64>;
}

/// Depth-first branch and bound over pools sorted by pledge per unit of stake, pruned with
/// the fractional (LP) relaxation. Gives up after `node_limit` nodes.
#[derive(Debug, Clone, Copy)]
pub struct BranchAndBound {
    pub node_limit: usize,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            node_limit: 1_000_000,
        }
    }
}

struct Search<'a> {
    items: &'a [(f64, f64)],
    suffix_stake: Vec<f64>,
    target: f64,
    best: f64,
    nodes: usize,
    node_limit: usize,
}

impl Search<'_> {
    /// Cheapest fractional completion from `start` on. Infinite if the target is out of reach.
    fn relaxation(&self, start: usize, needed: f64) -> f64 {
        if needed > self.suffix_stake[start] {
            return f64::INFINITY;
        }
        let mut needed = needed;
        let mut bound = 0.0;
        for (pledge, stake) in &self.items[start..] {
            if needed <= 0.0 {
                break;
            }
            let take = stake.min(needed);
            bound += pledge * take / stake;
            needed -= take;
        }
        bound
    }

    fn explore(&mut self, index: usize, pledge: f64, stake: f64) -> Result<()> {
        self.nodes += 1;
        if self.nodes > self.node_limit {
            return Err(SimulationError::OptimizerUnavailable(format!(
                "no proof of optimality within {} nodes",
                self.node_limit
            )));
        }
        if stake >= self.target {
            self.best = self.best.min(pledge);
            return Ok(());
        }
        if index == self.items.len() {
            return Ok(());
        }
        if pledge + self.relaxation(index, self.target - stake) >= self.best {
            return Ok(());
        }
        let (item_pledge, item_stake) = self.items[index];
        self.explore(index + 1, pledge + item_pledge, stake + item_stake)?;
        self.explore(index + 1, pledge, stake)
    }
}

impl PledgeOptimizer for BranchAndBound {
    fn min_aggregate_pledge(&self, pools: &[(f64, f64)]) -> Result<f64> {
        let total: f64 = pools.iter().map(|(_, stake)| stake).sum();
        if pools.is_empty() || total <= 0.0 {
            return Ok(0.0);
        }
        let mut items: Vec<(f64, f64)> = pools.iter().copied().filter(|(_, s)| *s > 0.0).collect();
        items.sort_by(|a, b| (a.0 / a.1).total_cmp(&(b.0 / b.1)));
        let mut suffix_stake = vec![0.0; items.len() + 1];
        for i in (0..items.len()).rev() {
            suffix_stake[i] = suffix_stake[i + 1] + items[i].1;
        }

        let mut search = Search {
            items: &items,
            suffix_stake,
            // the sums are built in a different order, so allow for rounding
            target: total / 2.0 * (1.0 - 1e-12),
            best: f64::INFINITY,
            nodes: 0,
            node_limit: self.node_limit,
        };
        search.explore(0, 0.0, 0.0)?;
        Ok(search.best)
    }
}

/// The minimum aggregate pledge, or [`MIN_AGGREGATE_PLEDGE_UNAVAILABLE`] if `optimizer`
/// fails.
pub fn min_aggregate_pledge(sim: &Simulation, optimizer: &dyn PledgeOptimizer) -> f64 {
    let pairs: Vec<(f64, f64)> = pools(sim).map(|p| (p.pledge(), p.stake())).collect();
    match optimizer.min_aggregate_pledge(&pairs) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "minimum aggregate pledge unavailable");
            MIN_AGGREGATE_PLEDGE_UNAVAILABLE
        }
    }
}

// === History ===

/// The state of the system at the start of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSnapshot {
    pub step: usize,
    pub pool_count: usize,
    /// Every pool ever opened; closed ones at 0.
    pub pool_sizes: BTreeMap<PoolId, f64>,
    /// Total stake of the pools each agent runs, indexed by agent id.
    pub pool_sizes_by_owner: Vec<f64>,
    /// Best desirability among each agent's pools, indexed by agent id.
    pub desirabilities_by_agent: Vec<f64>,
    pub mean_pledge: f64,
    pub stake_pairs: Vec<StakePair>,
}

impl StepSnapshot {
    pub fn capture(sim: &Simulation) -> Self {
        let num_agents = sim.agents().len();
        let mut pool_sizes: BTreeMap<PoolId, f64> =
            sim.ledger().retired().iter().map(|id| (*id, 0.0)).collect();
        let mut pool_sizes_by_owner = vec![0.0_f64; num_agents];
        let mut desirabilities_by_agent = vec![0.0_f64; num_agents];
        for pool in pools(sim) {
            pool_sizes.insert(pool.id(), pool.stake());
            let owner = pool.owner().0;
            if owner < num_agents {
                pool_sizes_by_owner[owner] += pool.stake();
                desirabilities_by_agent[owner] = desirabilities_by_agent[owner].max(pool.desirability());
            }
        }
        Self {
            step: sim.current_step(),
            pool_count: pool_count(sim),
            pool_sizes,
            pool_sizes_by_owner,
            desirabilities_by_agent,
            mean_pledge: mean_pledge(sim),
            stake_pairs: stake_pairs(sim),
        }
    }
}

// === Summary ===

/// Every reporter at the current state of a run, ready to serialise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub status: RunStatus,
    pub steps: usize,
    pub pool_count: usize,
    pub operator_count: usize,
    pub mean_margin: f64,
    pub median_margin: f64,
    pub contract_histogram: BTreeMap<String, usize>,
    pub mean_pledge: f64,
    pub median_pledge: f64,
    pub total_pledge: f64,
    pub pledge_rate: f64,
    pub total_delegated: f64,
    pub total_pool_stake: f64,
    pub total_insurance: f64,
    pub total_cost: f64,
    pub unused_stake: f64,
    pub liquidity_gain: f64,
    pub mean_pools_per_operator: f64,
    pub max_pools_per_operator: usize,
    pub median_pools_per_operator: f64,
    pub pool_splitter_count: usize,
    pub cost_efficient_count: usize,
    pub nakamoto_coefficient: usize,
    pub statistical_distance: f64,
    pub homogeneity_factor: f64,
    pub hhi: f64,
    pub gini_pool_count: f64,
    pub gini_controlled_stake: f64,
    pub gini_controlled_stake_k_agents: f64,
    pub mean_owner_stake_rank: f64,
    pub median_owner_stake_rank: f64,
    pub mean_owner_cost_rank: f64,
    pub median_owner_cost_rank: f64,
    pub stake_stats: StakeStats,
    pub stake_pairs: Vec<StakePair>,
    pub min_aggregate_pledge: f64,
}

impl ReportSummary {
    pub fn collect(sim: &Simulation, optimizer: &dyn PledgeOptimizer) -> Self {
        Self {
            status: sim.status(),
            steps: sim.current_step(),
            pool_count: pool_count(sim),
            operator_count: operator_count(sim),
            mean_margin: mean_margin(sim),
            median_margin: median_margin(sim),
            contract_histogram: contract_histogram(sim),
            mean_pledge: mean_pledge(sim),
            median_pledge: median_pledge(sim),
            total_pledge: total_pledge(sim),
            pledge_rate: pledge_rate(sim),
            total_delegated: total_delegated(sim),
            total_pool_stake: total_pool_stake(sim),
            total_insurance: total_insurance(sim),
            total_cost: total_cost(sim),
            unused_stake: unused_stake(sim),
            liquidity_gain: liquidity_gain(sim),
            mean_pools_per_operator: mean_pools_per_operator(sim),
            max_pools_per_operator: max_pools_per_operator(sim),
            median_pools_per_operator: median_pools_per_operator(sim),
            pool_splitter_count: pool_splitter_count(sim),
            cost_efficient_count: cost_efficient_count(sim),
            nakamoto_coefficient: nakamoto_coefficient(sim),
            statistical_distance: statistical_distance(sim),
            homogeneity_factor: homogeneity_factor(sim),
            hhi: hhi(sim),
            gini_pool_count: gini_pool_count(sim),
            gini_controlled_stake: gini_controlled_stake(sim),
            gini_controlled_stake_k_agents: gini_controlled_stake_k_agents(sim),
            mean_owner_stake_rank: mean_owner_stake_rank(sim),
            median_owner_stake_rank: median_owner_stake_rank(sim),
            mean_owner_cost_rank: mean_owner_cost_rank(sim),
            median_owner_cost_rank: median_owner_cost_rank(sim),
            stake_stats: stake_distribution_stats(sim),
            stake_pairs: stake_pairs(sim),
            min_aggregate_pledge: min_aggregate_pledge(sim, optimizer),
        }
    }
}
