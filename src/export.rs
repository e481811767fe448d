// src/export.rs

//! End-of-run dump as comma-separated files.

use crate::error::Result;
use crate::simulation::Simulation;
use crate::types::AgentId;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FINAL_CONFIGURATION_FILE: &str = "final_configuration.csv";
pub const POOL_SIZES_FILE: &str = "pool_sizes_by_step.csv";
pub const DESIRABILITIES_FILE: &str = "desirabilities_by_step.csv";

/// Writes all three tables into `dir`, creating it if needed. Returns the written paths.
pub fn export_run(sim: &Simulation, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let files = [
        (FINAL_CONFIGURATION_FILE, final_configuration_csv(sim)),
        (POOL_SIZES_FILE, pool_sizes_by_step_csv(sim)),
        (DESIRABILITIES_FILE, desirabilities_by_step_csv(sim)),
    ];
    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.join(name);
        fs::write(&path, contents)?;
        debug!(path = %path.display(), "wrote export");
        written.push(path);
    }
    Ok(written)
}

/// 1-based rank of each agent by the profit it could make from a saturated pool pledging its
/// whole stake. Ties go to the lower id.
fn potential_profit_ranks(sim: &Simulation) -> HashMap<AgentId, usize> {
    let mut profits: Vec<(AgentId, f64)> = sim
        .agents()
        .iter()
        .map(|a| (a.id(), sim.reward().potential_reward(a.stake()) - a.cost()))
        .collect();
    profits.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    profits
        .into_iter()
        .enumerate()
        .map(|(rank, (id, _))| (id, rank + 1))
        .collect()
}

/// One row per live pool.
pub fn final_configuration_csv(sim: &Simulation) -> String {
    let ranks = potential_profit_ranks(sim);
    let mut out = String::from(
        "pool_owner_id,pool_id,owner_stake,pool_stake,cost,pledge,margin,insurance,\
         is_private,potential_profit,desirability,potential_profit_rank\n",
    );
    for pool in sim.ledger().pools().values() {
        let owner_stake = sim.agent(pool.owner()).map_or(0.0, |a| a.stake());
        let rank = ranks.get(&pool.owner()).copied().unwrap_or(0);
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            pool.owner().0,
            pool.id().0,
            owner_stake,
            pool.stake(),
            pool.cost(),
            pool.pledge(),
            pool.margin(),
            pool.insurance(),
            pool.is_private(),
            pool.potential_profit(),
            pool.desirability(),
            rank
        );
    }
    out
}

fn agent_header(num_agents: usize) -> String {
    let ids: Vec<String> = (0..num_agents).map(|i| i.to_string()).collect();
    ids.join(",") + "\n"
}

fn join_row(values: &[f64]) -> String {
    let cells: Vec<String> = values.iter().map(f64::to_string).collect();
    cells.join(",") + "\n"
}

/// Per step, the stake each agent's pools held. Columns are agent ids.
pub fn pool_sizes_by_step_csv(sim: &Simulation) -> String {
    let mut out = agent_header(sim.agents().len());
    for snapshot in sim.history() {
        out.push_str(&join_row(&snapshot.pool_sizes_by_owner));
    }
    out
}

/// Per step, the best desirability among each agent's pools. Columns are agent ids.
pub fn desirabilities_by_step_csv(sim: &Simulation) -> String {
    let mut out = agent_header(sim.agents().len());
    for snapshot in sim.history() {
        out.push_str(&join_row(&snapshot.desirabilities_by_agent));
    }
    out
}
