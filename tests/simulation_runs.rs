// tests/simulation_runs.rs

//! Whole-run checks through the public API.

use proptest::prelude::*;
use staking_pool_sim::{
    ActivationOrder, BranchAndBound, CostDistribution, OperatorPolicy, ReportSummary, RunStatus,
    Simulation, SimulationConfig, StakeDistribution,
};

fn config(num_agents: usize, seed: u64) -> SimulationConfig {
    SimulationConfig {
        num_agents,
        alpha: 0.01,
        beta: 0.1,
        max_steps: 60,
        seed,
        ..Default::default()
    }
}

/// Every agent's committed strategy agrees with what the ledger holds.
fn assert_agents_match_ledger(sim: &Simulation) {
    assert!(sim.ledger().is_consistent(), "Ledger ranking drifted from its pools.");
    for agent in sim.agents() {
        for id in agent.strategy().owned_pools().keys() {
            let pool = sim
                .ledger()
                .pool(*id)
                .unwrap_or_else(|| panic!("{} claims missing pool {}", agent.id(), id));
            assert_eq!(pool.owner(), agent.id(), "Pool {id} has the wrong owner.");
        }
        for (id, amount) in agent.strategy().stake_allocations() {
            let pool = sim
                .ledger()
                .pool(*id)
                .unwrap_or_else(|| panic!("{} delegates to missing pool {}", agent.id(), id));
            assert!(
                (pool.delegation_of(agent.id()) - amount).abs() < 1e-9,
                "Pool {id} disagrees with {} about its delegation.",
                agent.id()
            );
        }
    }
    for pool in sim.ledger().pools().values() {
        let owner = sim.agent(pool.owner()).expect("pool owner exists");
        assert!(owner.strategy().owns(pool.id()), "Orphaned pool {}.", pool.id());
    }
}

#[test]
fn test_same_seed_gives_same_run() {
    // Arrange
    let mut first = Simulation::new(config(40, 7)).unwrap();
    let mut second = Simulation::new(config(40, 7)).unwrap();

    // Act
    first.run().unwrap();
    second.run().unwrap();

    // Assert
    let optimizer = BranchAndBound::default();
    assert_eq!(first.current_step(), second.current_step());
    assert_eq!(
        ReportSummary::collect(&first, &optimizer),
        ReportSummary::collect(&second, &optimizer),
        "Identical seeds must reproduce the run exactly."
    );
    let ids = |sim: &Simulation| sim.ledger().pools().keys().copied().collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn test_run_terminates_with_consistent_ledger() {
    let mut sim = Simulation::new(config(60, 3)).unwrap();

    let status = sim.run().unwrap();

    assert!(status.is_terminal());
    assert!(sim.current_step() <= 60);
    assert_agents_match_ledger(&sim);
    assert!(!sim.ledger().is_empty(), "Someone should find it worth running a pool.");
}

#[test]
fn test_simultaneous_activation_terminates() {
    let config = SimulationConfig {
        activation_order: ActivationOrder::Simultaneous,
        ..config(30, 11)
    };
    let mut sim = Simulation::new(config).unwrap();

    let status = sim.run().unwrap();

    assert!(status.is_terminal());
    assert_agents_match_ledger(&sim);
}

fn free_margin_config(num_agents: usize, cost: f64) -> SimulationConfig {
    SimulationConfig {
        operator_policy: OperatorPolicy::FreeMargin,
        activation_order: ActivationOrder::Sequential,
        stake_distribution: StakeDistribution::Flat,
        cost_distribution: CostDistribution::Fixed { cost },
        max_steps: 100,
        ..config(num_agents, 5)
    }
}

#[test]
fn test_free_margin_policy_converges_with_bounded_pools() {
    // Arrange: four equal holders competing for k = 10 saturated pools
    let mut sim = Simulation::new(free_margin_config(4, 0.001)).unwrap();

    // Act
    let status = sim.run().unwrap();

    // Assert
    assert_eq!(status, RunStatus::Converged, "Equal holders must stop undercutting each other.");
    assert_agents_match_ledger(&sim);
    let capacity = sim.reward().saturated_pool_capacity();
    let beta = sim.config().beta;
    let public = sim.ledger().pools().values().filter(|p| !p.is_private()).count();
    assert!(public <= capacity, "{public} public pools for {capacity} saturation slots.");
    for agent in sim.agents() {
        let solo = agent.strategy().owned_pools().values().filter(|p| p.is_private()).count();
        assert!(
            solo as f64 <= (agent.stake() / beta).ceil(),
            "{} runs {solo} solo pools with stake {}",
            agent.id(),
            agent.stake()
        );
    }
    let max_margin = sim.config().max_margin;
    assert!(
        sim.ledger().pools().values().all(|p| p.margin() <= max_margin + 1e-12),
        "No pool may charge more than the margin cap."
    );
}

#[test]
fn test_free_margin_pool_count_stays_near_capacity() {
    let mut sim = Simulation::new(free_margin_config(10, 0.002)).unwrap();

    let status = sim.run().unwrap();

    assert_eq!(status, RunStatus::Converged);
    let capacity = sim.reward().saturated_pool_capacity();
    assert!(
        sim.ledger().len() <= capacity + sim.agents().len(),
        "{} pools for capacity {capacity}",
        sim.ledger().len()
    );
}

#[test]
fn test_converged_registry_matches_previous_step() {
    // Arrange
    let mut sim = Simulation::new(free_margin_config(4, 0.002)).unwrap();
    let mut before_last_step;

    // Act
    let status = loop {
        before_last_step = sim.ledger().pools().clone();
        let status = sim.step().unwrap();
        if status.is_terminal() {
            break status;
        }
    };

    // Assert
    assert_eq!(status, RunStatus::Converged);
    assert!(!sim.ledger().is_empty(), "Somebody operates at convergence.");
    assert_eq!(
        sim.ledger().pools(),
        &before_last_step,
        "An idle final step leaves every pool untouched."
    );
    let recorded = sim.history().last().unwrap();
    assert_eq!(recorded.pool_count, sim.ledger().len());
}

#[test]
fn test_unprofitable_population_converges_without_pools() {
    let config = SimulationConfig {
        cost_distribution: CostDistribution::Fixed { cost: 10.0 },
        stake_distribution: StakeDistribution::Flat,
        ..config(20, 1)
    };
    let mut sim = Simulation::new(config).unwrap();

    let status = sim.run().unwrap();

    assert_eq!(status, RunStatus::Converged);
    assert!(sim.ledger().is_empty());
    assert_eq!(sim.current_step() as u32, sim.config().convergence_threshold);
}

#[test]
fn test_tiny_budget_exhausts() {
    let config = SimulationConfig {
        max_steps: 1,
        ..config(40, 9)
    };
    let mut sim = Simulation::new(config).unwrap();

    let status = sim.run().unwrap();

    assert_eq!(status, RunStatus::Exhausted, "One step cannot satisfy the idle threshold.");
    assert_eq!(sim.current_step(), 1);
}

#[test]
fn test_summary_serializes_to_json() {
    let mut sim = Simulation::new(config(25, 2)).unwrap();
    sim.run().unwrap();

    let summary = ReportSummary::collect(&sim, &BranchAndBound::default());
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["pool_count"], sim.ledger().len());
    assert!(json["status"].is_string());
    assert!(json["gini_controlled_stake"].as_f64().is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_any_seed_keeps_ledger_consistent(seed in any::<u64>(), num_agents in 2usize..25) {
        let config = SimulationConfig { max_steps: 15, ..config(num_agents, seed) };
        let mut sim = Simulation::new(config).unwrap();

        sim.run().unwrap();

        prop_assert!(sim.ledger().is_consistent());
        let pooled: f64 = sim.ledger().pools().values().map(|p| p.stake()).sum();
        let held: f64 = sim.agents().iter().map(|a| a.stake()).sum();
        prop_assert!(pooled <= held + 1e-9, "Pools hold {pooled} but agents only own {held}.");
    }
}
