// src/simulation/config.rs

use super::activation::ActivationOrder;
use crate::agents::config::{
    DEFAULT_MAX_MARGIN, EXTRA_POOL_COST_FRACTION, IDLE_STEPS_FOR_CONVERGENCE, MARGIN_INCREMENT,
    MAX_NUM_POOLS,
};
use crate::agents::{OperatorPolicy, OperatorRules};
use crate::error::{Result, SimulationError};
use crate::rewards::{RewardFunction, RewardParams, RewardScheme};
use crate::sampling::{CostDistribution, StakeDistribution};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Every global parameter of a run. Missing fields in a JSON file fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_agents: usize,
    /// Minimum effective balance.
    pub alpha: f64,
    /// Saturation threshold.
    pub beta: f64,
    pub total_stake: f64,
    pub reward_scheme: RewardScheme,
    pub operator_policy: OperatorPolicy,
    pub activation_order: ActivationOrder,
    pub max_steps: usize,
    /// Consecutive steps without any change before the run counts as converged.
    pub convergence_threshold: u32,
    pub extra_pool_cost_fraction: f64,
    /// Share of delegated stake that stays liquid.
    pub liquidity: f64,
    pub myopic_fraction: f64,
    pub max_margin: f64,
    pub margin_boost: f64,
    pub max_pools_per_agent: usize,
    pub stake_distribution: StakeDistribution,
    pub cost_distribution: CostDistribution,
    pub seed: u64,
    pub record_history: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_agents: 100,
            alpha: 0.1,
            beta: 0.2,
            total_stake: 1.0,
            reward_scheme: RewardScheme::default(),
            operator_policy: OperatorPolicy::default(),
            activation_order: ActivationOrder::default(),
            max_steps: 100,
            convergence_threshold: IDLE_STEPS_FOR_CONVERGENCE,
            extra_pool_cost_fraction: EXTRA_POOL_COST_FRACTION,
            liquidity: 1.0,
            myopic_fraction: 0.0,
            max_margin: DEFAULT_MAX_MARGIN,
            margin_boost: MARGIN_INCREMENT,
            max_pools_per_agent: MAX_NUM_POOLS,
            stake_distribution: StakeDistribution::default(),
            cost_distribution: CostDistribution::default(),
            seed: 42,
            record_history: true,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SimulationError::InvalidConfiguration(msg));
        if !(self.beta > 0.0) {
            return invalid(format!("beta must be positive, got {}", self.beta));
        }
        if !(self.alpha >= 0.0 && self.alpha <= self.beta) {
            return invalid(format!(
                "alpha must lie in [0, beta = {}], got {}",
                self.beta, self.alpha
            ));
        }
        if !(self.total_stake > 0.0) {
            return invalid(format!("total stake must be positive, got {}", self.total_stake));
        }
        if !(self.liquidity > 0.0 && self.liquidity <= 1.0) {
            return invalid(format!("liquidity must lie in (0, 1], got {}", self.liquidity));
        }
        if self.convergence_threshold == 0 {
            return invalid("convergence threshold must be at least one step".to_string());
        }
        if !(0.0..=1.0).contains(&self.myopic_fraction) {
            return invalid(format!(
                "myopic fraction must lie in [0, 1], got {}",
                self.myopic_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.max_margin) {
            return invalid(format!("max margin must lie in [0, 1], got {}", self.max_margin));
        }
        if !(self.extra_pool_cost_fraction >= 0.0) {
            return invalid(format!(
                "extra pool cost fraction must be non-negative, got {}",
                self.extra_pool_cost_fraction
            ));
        }
        if self.max_pools_per_agent == 0 {
            return invalid("agents must be allowed at least one pool".to_string());
        }
        // scheme parameters are checked by the reward function itself
        self.reward_function().map(|_| ())
    }

    pub fn reward_function(&self) -> Result<RewardFunction> {
        RewardFunction::new(
            self.reward_scheme,
            RewardParams {
                alpha: self.alpha,
                beta: self.beta,
                total_stake: self.total_stake,
            },
        )
    }

    pub fn operator_rules(&self) -> OperatorRules {
        OperatorRules {
            policy: self.operator_policy,
            extra_pool_cost_fraction: self.extra_pool_cost_fraction,
            max_margin: self.max_margin,
            margin_boost: self.margin_boost,
            max_pools_per_agent: self.max_pools_per_agent,
        }
    }

    /// Agents with an id below this count are myopic.
    pub fn num_myopic(&self) -> usize {
        (self.myopic_fraction * self.num_agents as f64).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"num_agents": 7, "activation_order": "simultaneous"}"#).unwrap();

        assert_eq!(config.num_agents, 7);
        assert_eq!(config.activation_order, ActivationOrder::Simultaneous);
        assert_eq!(config.beta, 0.2);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let cases = [
            SimulationConfig { beta: 0.0, ..Default::default() },
            SimulationConfig { alpha: -0.1, ..Default::default() },
            SimulationConfig { alpha: 0.3, ..Default::default() },
            SimulationConfig { total_stake: 0.0, ..Default::default() },
            SimulationConfig { liquidity: 0.0, ..Default::default() },
            SimulationConfig { liquidity: 1.5, ..Default::default() },
            SimulationConfig { convergence_threshold: 0, ..Default::default() },
            SimulationConfig { myopic_fraction: 1.1, ..Default::default() },
            SimulationConfig { max_margin: 2.0, ..Default::default() },
            SimulationConfig { extra_pool_cost_fraction: -0.1, ..Default::default() },
            SimulationConfig {
                reward_scheme: RewardScheme::PledgeBonus { a0: -1.0 },
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(SimulationError::InvalidConfiguration(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_myopic_agents_are_counted_from_the_front() {
        let config = SimulationConfig {
            num_agents: 10,
            myopic_fraction: 0.35,
            ..Default::default()
        };

        assert_eq!(config.num_myopic(), 3);
    }
}
