// src/sampling.rs

//! Initial stake and cost draws for the agent population.

use crate::error::{Result, SimulationError};
use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal, Pareto, Uniform};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Upper bound on redraws when truncating a Pareto or normal sample.
const MAX_REJECTIONS: usize = 100_000;

/// How the total stake is split across agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StakeDistribution {
    /// Everyone gets the same share.
    Flat,
    /// Lomax (shifted Pareto) draws. With a truncation factor, no agent may hold more than
    /// `sum / truncation_factor`; offenders are redrawn.
    Pareto {
        shape: f64,
        #[serde(default)]
        truncation_factor: Option<f64>,
    },
    /// Real balances read from the last column of a CSV file (header skipped), drawn without
    /// replacement.
    Empirical { path: PathBuf },
}

impl Default for StakeDistribution {
    fn default() -> Self {
        StakeDistribution::Pareto {
            shape: 2.0,
            truncation_factor: None,
        }
    }
}

impl StakeDistribution {
    /// Draws `num_agents` stakes summing to `total_stake`.
    pub fn sample<R: Rng>(
        &self,
        num_agents: usize,
        total_stake: f64,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let raw = match self {
            StakeDistribution::Flat => vec![1.0; num_agents],
            StakeDistribution::Pareto {
                shape,
                truncation_factor,
            } => sample_lomax(num_agents, *shape, *truncation_factor, rng)?,
            StakeDistribution::Empirical { path } => {
                let stakes = read_stake_file(path)?;
                if stakes.len() < num_agents {
                    return Err(SimulationError::InvalidConfiguration(format!(
                        "{} holds {} usable stakes, {num_agents} needed",
                        path.display(),
                        stakes.len()
                    )));
                }
                stakes.choose_multiple(rng, num_agents).copied().collect()
            }
        };
        Ok(normalize(raw, total_stake))
    }
}

fn sample_lomax<R: Rng>(
    num_agents: usize,
    shape: f64,
    truncation_factor: Option<f64>,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let pareto = Pareto::new(1.0, shape).map_err(|e| {
        SimulationError::InvalidConfiguration(format!("pareto shape {shape}: {e}"))
    })?;
    let draw = |rng: &mut R| pareto.sample(rng) - 1.0;
    let mut sample: Vec<f64> = (0..num_agents).map(|_| draw(rng)).collect();

    let Some(factor) = truncation_factor.filter(|f| *f > 0.0) else {
        return Ok(sample);
    };
    for _ in 0..MAX_REJECTIONS {
        let sum: f64 = sample.iter().sum();
        let Some((index, max)) = sample
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return Ok(sample);
        };
        if max <= sum / factor {
            return Ok(sample);
        }
        sample.remove(index);
        sample.push(draw(rng));
    }
    Err(SimulationError::InvalidConfiguration(format!(
        "truncation factor {factor} could not be met for {num_agents} agents"
    )))
}

fn read_stake_file(path: &Path) -> Result<Vec<f64>> {
    let contents = fs::read_to_string(path)?;
    let stakes: Vec<f64> = contents
        .lines()
        .skip(1)
        .filter_map(|line| line.rsplit(',').next())
        .filter_map(|field| field.trim().parse::<f64>().ok())
        .filter(|stake| *stake > 0.0)
        .collect();
    if stakes.is_empty() {
        warn!(path = %path.display(), "stake file has no usable rows");
    }
    Ok(stakes)
}

/// Rescales `values` to sum to `total`. The last element absorbs the floating-point error.
pub fn normalize(mut values: Vec<f64>, total: f64) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum == 0.0 {
        return values;
    }
    for value in values.iter_mut() {
        *value = total * *value / sum;
    }
    let error = total - values.iter().sum::<f64>();
    if let Some(last) = values.last_mut() {
        *last += error;
    }
    values
}

/// How per-pool operating costs are assigned to agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostDistribution {
    Fixed { cost: f64 },
    Uniform { low: f64, high: f64 },
    /// A handful of cost levels drawn uniformly, then each agent picks one of them.
    Bands { low: f64, high: f64, num_bands: usize },
    /// Normal around `mean`, redrawn until the cost lands in `[low, high]`.
    TruncatedNormal {
        mean: f64,
        std_dev: f64,
        low: f64,
        high: f64,
    },
}

impl Default for CostDistribution {
    fn default() -> Self {
        CostDistribution::Uniform {
            low: 0.001,
            high: 0.002,
        }
    }
}

impl CostDistribution {
    pub fn sample<R: Rng>(&self, num_agents: usize, rng: &mut R) -> Result<Vec<f64>> {
        match *self {
            CostDistribution::Fixed { cost } => Ok(vec![cost; num_agents]),
            CostDistribution::Uniform { low, high } => {
                let uniform = cost_range(low, high)?;
                Ok((0..num_agents).map(|_| uniform.sample(rng)).collect())
            }
            CostDistribution::Bands {
                low,
                high,
                num_bands,
            } => {
                if num_bands == 0 {
                    return Err(SimulationError::InvalidConfiguration(
                        "cost bands need at least one band".to_string(),
                    ));
                }
                let uniform = cost_range(low, high)?;
                let bands: Vec<f64> = (0..num_bands).map(|_| uniform.sample(rng)).collect();
                Ok((0..num_agents)
                    .map(|_| bands[rng.gen_range(0..bands.len())])
                    .collect())
            }
            CostDistribution::TruncatedNormal {
                mean,
                std_dev,
                low,
                high,
            } => {
                if !(low >= 0.0 && low <= high) {
                    return Err(SimulationError::InvalidConfiguration(format!(
                        "cost bounds [{low}, {high}] are empty or negative"
                    )));
                }
                let normal = Normal::new(mean, std_dev).map_err(|e| {
                    SimulationError::InvalidConfiguration(format!(
                        "cost normal ({mean}, {std_dev}): {e}"
                    ))
                })?;
                (0..num_agents)
                    .map(|_| sample_within(&normal, low, high, rng))
                    .collect()
            }
        }
    }
}

fn sample_within<R: Rng>(normal: &Normal<f64>, low: f64, high: f64, rng: &mut R) -> Result<f64> {
    for _ in 0..MAX_REJECTIONS {
        let cost = normal.sample(rng);
        if (low..=high).contains(&cost) {
            return Ok(cost);
        }
    }
    Err(SimulationError::InvalidConfiguration(format!(
        "no cost drawn inside [{low}, {high}] after {MAX_REJECTIONS} tries"
    )))
}

fn cost_range(low: f64, high: f64) -> Result<Uniform<f64>> {
    if !(low >= 0.0 && low < high) {
        return Err(SimulationError::InvalidConfiguration(format!(
            "cost range [{low}, {high}) is empty or negative"
        )));
    }
    Ok(Uniform::new(low, high))
}
