// src/rewards/reward_scheme.rs

use crate::agents::config::TOTAL_EPOCH_REWARDS_R;
use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};

/// The network-wide parameters every reward curve is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardParams {
    /// Minimum effective balance. Pools below it earn nothing.
    pub alpha: f64,
    /// Saturation threshold. Stake beyond it earns nothing extra.
    pub beta: f64,
    pub total_stake: f64,
}

/// The interchangeable reward curves. `Ethereum` is the reference policy; the others add a
/// pledge-dependent bonus on top of the same floor-and-cap shape.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardScheme {
    /// Proportional to capped stake, nothing below alpha.
    #[default]
    Ethereum,
    /// Multiplicative pledge bonus: `s' (1 + a0 p'/beta)`.
    PledgeBonus { a0: f64 },
    /// Additive pledge bonus: `s' + a0 p'`.
    PledgeLinear { a0: f64 },
    /// Multiplicative bonus on the square root of pledge.
    PledgeSqrt { a0: f64 },
    /// Pledge bent by a root curve before entering the interaction-term formula.
    CurvePledgeBenefit {
        a0: f64,
        curve_root: f64,
        crossover_factor: f64,
    },
}

impl RewardScheme {
    /// Raw per-epoch reward of a pool. Pure; callers pass whatever stake/pledge applies.
    pub fn reward(&self, stake: f64, pledge: f64, params: &RewardParams) -> f64 {
        if stake < params.alpha {
            return 0.0;
        }
        let beta = params.beta;
        let s = stake.min(beta);
        let p = pledge.max(0.0).min(beta);
        let scaled = match *self {
            RewardScheme::Ethereum => s,
            RewardScheme::PledgeBonus { a0 } => s * (1.0 + a0 * p / beta) / (1.0 + a0),
            RewardScheme::PledgeLinear { a0 } => (s + a0 * p) / (1.0 + a0),
            RewardScheme::PledgeSqrt { a0 } => s * (1.0 + a0 * p.sqrt() / beta) / (1.0 + a0),
            RewardScheme::CurvePledgeBenefit {
                a0,
                curve_root,
                crossover_factor,
            } => {
                let crossover = beta / crossover_factor;
                let bent = (pledge.max(0.0).powf(1.0 / curve_root)
                    * crossover.powf((curve_root - 1.0) / curve_root))
                .min(beta);
                (s + bent * a0 * (s - bent * (1.0 - s / beta)) / beta) / (1.0 + a0)
            }
        };
        TOTAL_EPOCH_REWARDS_R * scaled / params.total_stake
    }

    fn validate(&self) -> Result<()> {
        let a0 = match *self {
            RewardScheme::Ethereum => return Ok(()),
            RewardScheme::PledgeBonus { a0 }
            | RewardScheme::PledgeLinear { a0 }
            | RewardScheme::PledgeSqrt { a0 } => a0,
            RewardScheme::CurvePledgeBenefit {
                a0,
                curve_root,
                crossover_factor,
            } => {
                if !(curve_root >= 1.0) {
                    return Err(SimulationError::InvalidConfiguration(format!(
                        "curve root must be at least 1, got {curve_root}"
                    )));
                }
                if !(crossover_factor > 0.0) {
                    return Err(SimulationError::InvalidConfiguration(format!(
                        "crossover factor must be positive, got {crossover_factor}"
                    )));
                }
                a0
            }
        };
        if !(a0 >= 0.0) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "pledge influence must be non-negative, got {a0}"
            )));
        }
        Ok(())
    }
}

/// A reward scheme bound to validated parameters. This is what pools and agents hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardFunction {
    scheme: RewardScheme,
    params: RewardParams,
}

impl RewardFunction {
    pub fn new(scheme: RewardScheme, params: RewardParams) -> Result<Self> {
        if !(params.beta > 0.0) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "saturation threshold must be positive, got {}",
                params.beta
            )));
        }
        if !(params.alpha >= 0.0) || params.alpha > params.beta {
            return Err(SimulationError::InvalidConfiguration(format!(
                "minimum effective balance must lie in [0, {}], got {}",
                params.beta, params.alpha
            )));
        }
        if !(params.total_stake > 0.0) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "total stake must be positive, got {}",
                params.total_stake
            )));
        }
        scheme.validate()?;
        Ok(Self { scheme, params })
    }

    /// Canonical curve with the given alpha/beta/total stake.
    pub fn ethereum(alpha: f64, beta: f64, total_stake: f64) -> Result<Self> {
        Self::new(
            RewardScheme::Ethereum,
            RewardParams {
                alpha,
                beta,
                total_stake,
            },
        )
    }

    pub fn reward(&self, stake: f64, pledge: f64) -> f64 {
        self.scheme.reward(stake, pledge, &self.params)
    }

    /// What a pool with this pledge would earn once saturated.
    pub fn potential_reward(&self, pledge: f64) -> f64 {
        self.reward(self.params.beta, pledge)
    }

    pub fn saturation_threshold(&self) -> f64 {
        self.params.beta
    }

    pub fn min_effective_balance(&self) -> f64 {
        self.params.alpha
    }

    pub fn total_stake(&self) -> f64 {
        self.params.total_stake
    }

    pub fn scheme(&self) -> RewardScheme {
        self.scheme
    }

    pub fn params(&self) -> &RewardParams {
        &self.params
    }

    /// How many pools the network can hold at saturation; at least one.
    pub fn saturated_pool_capacity(&self) -> usize {
        ((self.params.total_stake / self.params.beta).floor() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eth() -> RewardFunction {
        RewardFunction::ethereum(0.1, 0.2, 1.0).unwrap()
    }

    fn all_schemes() -> Vec<RewardScheme> {
        vec![
            RewardScheme::Ethereum,
            RewardScheme::PledgeBonus { a0: 0.3 },
            RewardScheme::PledgeLinear { a0: 0.3 },
            RewardScheme::PledgeSqrt { a0: 0.3 },
            RewardScheme::CurvePledgeBenefit {
                a0: 0.3,
                curve_root: 3.0,
                crossover_factor: 8.0,
            },
        ]
    }

    #[test]
    fn test_ethereum_reward_examples() {
        let rf = eth();
        assert_eq!(rf.reward(0.01, 0.0), 0.0, "Below alpha there is no reward.");
        assert!((rf.reward(0.1, 0.0) - 0.1).abs() < 1e-12);
        assert!((rf.reward(0.2, 0.0) - 0.2).abs() < 1e-12);
        assert!((rf.reward(0.4, 0.0) - 0.2).abs() < 1e-12, "Flat beyond saturation.");
    }

    #[test]
    fn test_reward_scales_with_total_stake() {
        let rf = RewardFunction::ethereum(1.0, 32.0, 320.0).unwrap();
        assert!((rf.reward(32.0, 32.0) - 0.1).abs() < 1e-12);
        assert!((rf.potential_reward(5.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_curve_with_unit_root_matches_plain_pledge() {
        // root 1 leaves pledge unchanged, so the curve reduces to the interaction-term formula
        let params = RewardParams {
            alpha: 0.0,
            beta: 0.1,
            total_stake: 1.0,
        };
        let curve = RewardScheme::CurvePledgeBenefit {
            a0: 0.3,
            curve_root: 1.0,
            crossover_factor: 8.0,
        };
        let (s, p) = (0.05_f64, 0.01_f64);
        let expected = (s + p * 0.3 * (s - p * (1.0 - s / 0.1)) / 0.1) / 1.3;
        assert!((curve.reward(s, p, &params) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        assert!(RewardFunction::ethereum(0.1, 0.0, 1.0).is_err(), "Zero saturation threshold.");
        assert!(RewardFunction::ethereum(0.3, 0.2, 1.0).is_err(), "Alpha above beta.");
        assert!(RewardFunction::ethereum(0.1, 0.2, 0.0).is_err(), "Zero total stake.");
        let params = RewardParams {
            alpha: 0.1,
            beta: 0.2,
            total_stake: 1.0,
        };
        let bad_curve = RewardScheme::CurvePledgeBenefit {
            a0: 0.3,
            curve_root: 0.5,
            crossover_factor: 8.0,
        };
        assert!(matches!(
            RewardFunction::new(bad_curve, params),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_saturated_pool_capacity() {
        assert_eq!(eth().saturated_pool_capacity(), 5);
        let big_beta = RewardFunction::ethereum(0.0, 2.0, 1.0).unwrap();
        assert_eq!(big_beta.saturated_pool_capacity(), 1);
    }

    proptest! {
        #[test]
        fn reward_is_monotone_then_flat(
            a in 0.0f64..0.4,
            b in 0.0f64..0.4,
            pledge in 0.0f64..0.3,
        ) {
            let params = RewardParams { alpha: 0.1, beta: 0.2, total_stake: 1.0 };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for scheme in all_schemes() {
                let r_lo = scheme.reward(lo, pledge, &params);
                let r_hi = scheme.reward(hi, pledge, &params);
                prop_assert!(r_lo >= 0.0);
                prop_assert!(r_hi + 1e-15 >= r_lo, "{:?} decreased between {} and {}", scheme, lo, hi);
                if lo < 0.1 {
                    prop_assert_eq!(r_lo, 0.0);
                }
                if lo > 0.2 {
                    prop_assert!((r_hi - r_lo).abs() < 1e-15, "{:?} not flat above beta", scheme);
                }
            }
        }
    }
}
