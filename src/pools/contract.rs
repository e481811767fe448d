// src/pools/contract.rs

//! Liquid-staking contract tiers an operator can open pools under.

use serde::{Deserialize, Serialize};

/// One tier of the catalog. Factors are expressed against the minimum effective balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidContract {
    /// Commission the operator keeps.
    pub margin: f64,
    /// Share of the minimum effective balance the operator pledges itself.
    pub min_pledge_factor: f64,
    /// Share of the non-pledged part the operator must put up as insurance.
    pub insurance_factor: f64,
}

impl LiquidContract {
    pub const fn new(margin: f64, min_pledge_factor: f64, insurance_factor: f64) -> Self {
        Self {
            margin,
            min_pledge_factor,
            insurance_factor,
        }
    }

    pub fn min_pledge(&self, min_effective_balance: f64) -> f64 {
        self.min_pledge_factor * min_effective_balance
    }

    pub fn insurance(&self, min_effective_balance: f64) -> f64 {
        self.insurance_factor * (1.0 - self.min_pledge_factor) * min_effective_balance
    }

    /// Stake the operator has to own to open one pool under this tier.
    pub fn stake_requirement(&self, min_effective_balance: f64) -> f64 {
        min_effective_balance
            * (self.min_pledge_factor + self.insurance_factor
                - self.insurance_factor * self.min_pledge_factor)
    }

    /// A full-pledge tier is solo staking: nobody else can join.
    pub fn is_private(&self) -> bool {
        self.min_pledge_factor >= 1.0
    }
}

/// The catalog, sorted by descending pledge requirement. Entry 0 is solo staking.
pub fn contract_catalog() -> Vec<LiquidContract> {
    vec![
        LiquidContract::new(0.0, 1.0, 0.0),
        LiquidContract::new(0.05, 0.75, 0.1),
        LiquidContract::new(0.10, 0.5, 0.1),
        LiquidContract::new(0.15, 0.25, 0.1),
    ]
}
