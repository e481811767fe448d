// src/simulation/engine.rs

use super::activation::ActivationOrder;
use super::config::SimulationConfig;
use super::ledger::PoolLedger;
use crate::agents::{OperatorRules, Stakeholder};
use crate::error::{Result, SimulationError};
use crate::reporters::StepSnapshot;
use crate::rewards::RewardFunction;
use crate::types::AgentId;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info};

/// Where a run stands after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// No agent changed its strategy for `convergence_threshold` consecutive steps.
    Converged,
    /// Hit `max_steps` first.
    Exhausted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        self != RunStatus::Running
    }
}

/// The simulation engine. It owns the pool ledger and the agent population and runs the
/// best-response loop until the population settles or the step budget runs out.
pub struct Simulation {
    config: SimulationConfig,
    reward: RewardFunction,
    rules: OperatorRules,
    agents: Vec<Stakeholder>,
    ledger: PoolLedger,
    rng: StdRng,
    current_step: usize,
    idle_steps: u32,
    status: RunStatus,
    history: Vec<StepSnapshot>,
}

impl Simulation {
    /// Validates `config` and draws the population from its stake and cost distributions.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let stakes = config
            .stake_distribution
            .sample(config.num_agents, config.total_stake, &mut rng)?;
        let costs = config.cost_distribution.sample(config.num_agents, &mut rng)?;
        Self::build(config, stakes, costs, rng)
    }

    /// Builds a run over an explicit population. `num_agents` is taken from `stakes`.
    pub fn with_population(
        mut config: SimulationConfig,
        stakes: Vec<f64>,
        costs: Vec<f64>,
    ) -> Result<Self> {
        if stakes.len() != costs.len() {
            return Err(SimulationError::InvalidConfiguration(format!(
                "{} stakes but {} costs",
                stakes.len(),
                costs.len()
            )));
        }
        config.num_agents = stakes.len();
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Self::build(config, stakes, costs, rng)
    }

    fn build(
        config: SimulationConfig,
        stakes: Vec<f64>,
        costs: Vec<f64>,
        rng: StdRng,
    ) -> Result<Self> {
        if let Some(bad) = stakes.iter().chain(&costs).find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "stakes and costs must be finite and non-negative, got {bad}"
            )));
        }
        let num_myopic = config.num_myopic();
        let agents = stakes
            .into_iter()
            .zip(costs)
            .enumerate()
            .map(|(i, (stake, cost))| {
                Stakeholder::new(AgentId(i), stake, cost).with_myopia(i < num_myopic)
            })
            .collect();
        Ok(Self {
            reward: config.reward_function()?,
            rules: config.operator_rules(),
            config,
            agents,
            ledger: PoolLedger::new(),
            rng,
            current_step: 0,
            idle_steps: 0,
            status: RunStatus::Running,
            history: Vec::new(),
        })
    }

    // === Accessors ===

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn reward(&self) -> &RewardFunction {
        &self.reward
    }

    pub fn agents(&self) -> &[Stakeholder] {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&Stakeholder> {
        self.agents.get(id.0)
    }

    pub fn ledger(&self) -> &PoolLedger {
        &self.ledger
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn idle_steps(&self) -> u32 {
        self.idle_steps
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn history(&self) -> &[StepSnapshot] {
        &self.history
    }

    // === Driving the run ===

    /// One activation round. Once the run is terminal this is a no-op that returns the
    /// final status.
    pub fn step(&mut self) -> Result<RunStatus> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        if self.config.record_history {
            let snapshot = StepSnapshot::capture(self);
            self.history.push(snapshot);
        }

        let order = self
            .config
            .activation_order
            .schedule(self.agents.len(), &mut self.rng);
        let changes = match self.config.activation_order {
            ActivationOrder::Simultaneous => self.activate_simultaneously(&order)?,
            ActivationOrder::Sequential | ActivationOrder::Random => self.activate_in_turn(&order)?,
        };

        if changes == 0 {
            self.idle_steps += 1;
        } else {
            self.idle_steps = 0;
        }
        self.current_step += 1;

        self.status = if self.idle_steps >= self.config.convergence_threshold {
            info!(step = self.current_step, pools = self.ledger.len(), "population converged");
            RunStatus::Converged
        } else if self.current_step >= self.config.max_steps {
            info!(step = self.current_step, pools = self.ledger.len(), "step budget exhausted");
            RunStatus::Exhausted
        } else {
            RunStatus::Running
        };
        Ok(self.status)
    }

    /// Steps until the run converges or exhausts its budget.
    pub fn run(&mut self) -> Result<RunStatus> {
        loop {
            let status = self.step()?;
            if status.is_terminal() {
                return Ok(status);
            }
        }
    }

    /// Each agent sees the commits of everyone who went before it.
    fn activate_in_turn(&mut self, order: &[usize]) -> Result<usize> {
        let mut changes = 0;
        for &index in order {
            let wants_change = {
                let view = self.ledger.view(&self.reward, &self.rules);
                self.agents[index].update_strategy(&view)
            };
            if wants_change && self.commit_pending(index)? {
                changes += 1;
            }
        }
        Ok(changes)
    }

    /// Everyone decides against the same state, then commits go through in `order`.
    fn activate_simultaneously(&mut self, order: &[usize]) -> Result<usize> {
        {
            let view = self.ledger.view(&self.reward, &self.rules);
            for &index in order {
                self.agents[index].update_strategy(&view);
            }
        }
        let mut changes = 0;
        for &index in order {
            if self.commit_pending(index)? {
                changes += 1;
            }
        }
        Ok(changes)
    }

    /// Pushes an agent's pending strategy through the ledger and tells every other agent
    /// about pools that went away. Returns false when there was nothing to commit.
    fn commit_pending(&mut self, index: usize) -> Result<bool> {
        let agent = &mut self.agents[index];
        let Some(new) = agent.take_pending() else {
            return Ok(false);
        };
        if new == *agent.strategy() {
            return Ok(false);
        }
        let id = agent.id();
        let old = agent.strategy().clone();

        let outcome = self.ledger.commit(id, &old, new, &self.reward)?;
        debug!(
            agent = %id,
            step = self.current_step,
            pools = outcome.strategy.owned_pools().len(),
            delegations = outcome.strategy.stake_allocations().len(),
            "strategy committed"
        );
        self.agents[index].adopt(outcome.strategy);

        for (delegator, pool) in outcome.evictions {
            if let Some(agent) = self.agents.get_mut(delegator.0) {
                agent.drop_allocation(pool);
            }
        }
        for pool in outcome.withdrawn {
            for agent in self.agents.iter_mut() {
                if agent.pending().is_some_and(|p| p.allocation_to(pool) > 0.0) {
                    agent.drop_allocation(pool);
                }
            }
        }
        Ok(true)
    }
}
