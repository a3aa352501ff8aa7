//! Reserve-policy engine: declarative exposure/concentration checks (C6)
//! and bank risk scoring, stress testing, and role-weighted allocation (C7).

pub mod policy;
pub mod risk;

pub use policy::{evaluate, infer_institution_type, split_maturity, suggest_rebalancing, PolicyConfig, PolicyReport, RebalanceAction, RebalanceSuggestion};
pub use risk::{
 bank_risk_score, compute_rebalance_plan, compute_target_allocation, run_stress_test, AllocationPlan, RebalanceMove, RiskInputs, RiskScore, Role,
 StressResult, StressScenario, TargetAllocation,
};
