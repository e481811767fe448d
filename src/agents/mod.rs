// src/agents/mod.rs

pub mod config;
pub mod operator;
pub mod stakeholder;
pub mod utility;
pub mod view;

pub use operator::{OperatorPolicy, OperatorRules};
pub use stakeholder::{Choice, Decision, Stakeholder};
pub use view::StakingView;
