// src/simulation/activation.rs

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How agents take turns within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ActivationOrder {
    /// Agent 0 first, every step.
    Sequential,
    /// A fresh permutation each step.
    #[default]
    Random,
    /// Everyone decides against the same frozen state, then commits in order.
    Simultaneous,
}

impl ActivationOrder {
    /// Indices of `num_agents` agents in the order they act this step.
    pub fn schedule<R: Rng>(self, num_agents: usize, rng: &mut R) -> Vec<usize> {
        let mut order: Vec<usize> = (0..num_agents).collect();
        if self == ActivationOrder::Random {
            order.shuffle(rng);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_schedules() {
        let mut rng = StdRng::seed_from_u64(5);

        let sequential = ActivationOrder::Sequential.schedule(5, &mut rng);
        let mut random = ActivationOrder::Random.schedule(50, &mut rng);

        assert_eq!(sequential, vec![0, 1, 2, 3, 4]);
        random.sort_unstable();
        assert_eq!(random, (0..50).collect::<Vec<_>>(), "A shuffle is still a permutation.");
    }
}
