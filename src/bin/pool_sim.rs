// src/bin/pool_sim.rs

//! Staking pool formation CLI.
//!
//! Runs one simulation to convergence (or until the step budget runs out) and prints the
//! final reporters as JSON.

use anyhow::Context;
use clap::Parser;
use staking_pool_sim::{
    ActivationOrder, BranchAndBound, OperatorPolicy, ReportSummary, Simulation, SimulationConfig,
    export_run,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pool-sim")]
#[command(about = "Simulate how stake holders form staking pools")]
struct Cli {
    /// JSON file with simulation parameters. Flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of stake holders
    #[arg(short = 'n', long)]
    agents: Option<usize>,

    /// Minimum effective balance
    #[arg(long)]
    alpha: Option<f64>,

    /// Saturation threshold
    #[arg(long)]
    beta: Option<f64>,

    #[arg(long)]
    max_steps: Option<usize>,

    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(long, value_enum)]
    activation: Option<ActivationOrder>,

    #[arg(long, value_enum)]
    policy: Option<OperatorPolicy>,

    /// Directory for the CSV dump. Nothing is written without it.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(SimulationConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => SimulationConfig::default(),
        };
        if let Some(agents) = self.agents {
            config.num_agents = agents;
        }
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if let Some(beta) = self.beta {
            config.beta = beta;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(activation) = self.activation {
            config.activation_order = activation;
        }
        if let Some(policy) = self.policy {
            config.operator_policy = policy;
        }
        Ok((config, self.output))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (config, output) = Cli::parse().into_config()?;
    tracing::info!(
        agents = config.num_agents,
        alpha = config.alpha,
        beta = config.beta,
        seed = config.seed,
        "starting simulation"
    );

    let mut sim = Simulation::new(config).context("building simulation")?;
    sim.run().context("running simulation")?;

    if let Some(dir) = output {
        for path in export_run(&sim, &dir).context("writing export")? {
            tracing::info!(path = %path.display(), "exported");
        }
    }

    let summary = ReportSummary::collect(&sim, &BranchAndBound::default());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
