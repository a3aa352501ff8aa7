//! Risk & Allocation Engine (C7): bank risk scoring, stress
//! testing, and role-weighted target allocation.
//!
//! Each role carries a fixed weight and target-allocation limit used by
//! the rebalance-pairing algorithm, and the risk (FSS) score is a
//! piecewise-band combination of five weighted factors.

use std::collections::BTreeMap;

use kwon_spec::{BankExposure, CreditRating, InstitutionType, MaturityBucket};
use serde::{Deserialize, Serialize};

use crate::policy::infer_institution_type;

/// Non-exposure financial inputs to the risk score. These
/// are not part of the persisted `BankExposure` record; they come from a
/// separate, out-of-scope data feed (see Non-goals).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskInputs {
 pub lcr_pct: f64,
 pub insured_fraction: f64,
 pub cds_spread_bps: f64,
 pub news_sentiment: f64,
}

/// Weights for the five sub-scores.
const W_RATING: f64 = 0.35;
const W_LCR: f64 = 0.20;
const W_INSURED: f64 = 0.15;
const W_SPREAD: f64 = 0.20;
const W_NEWS: f64 = 0.10;

/// Sentinel score/reason for custody agents, which are excluded from risk
/// scoring.
pub const CUSTODY_SENTINEL_SCORE: f64 = 100.0;
pub const CUSTODY_SENTINEL_REASON: &str = "custody agent: no counterparty credit exposure, excluded from risk scoring";

fn rating_subscore(rating: Option<&CreditRating>) -> f64 {
 match rating {
 Some(CreditRating::Aaa) => 100.0,
 Some(CreditRating::AaPlus | CreditRating::Aa | CreditRating::AaMinus) => 90.0,
 Some(CreditRating::APlus | CreditRating::A) => 75.0,
 Some(CreditRating::BbbPlus | CreditRating::Bbb) => 60.0,
 Some(CreditRating::Bb | CreditRating::B) => 40.0,
 Some(CreditRating::Ccc | CreditRating::D) => 15.0,
 Some(CreditRating::Nr) | None => 50.0,
 }
}

fn lcr_subscore(lcr_pct: f64) -> f64 {
 if lcr_pct >= 120.0 {
 95.0
 } else if lcr_pct >= 100.0 {
 85.0
 } else if lcr_pct >= 80.0 {
 70.0
 } else {
 50.0
 }
}

fn insured_subscore(insured_fraction: f64) -> f64 {
 (insured_fraction.clamp(0.0, 1.0) * 100.0).max(30.0)
}

fn spread_subscore(cds_spread_bps: f64) -> f64 {
 if cds_spread_bps <= 30.0 {
 95.0
 } else if cds_spread_bps <= 75.0 {
 80.0
 } else if cds_spread_bps <= 150.0 {
 60.0
 } else if cds_spread_bps <= 300.0 {
 35.0
 } else {
 15.0
 }
}

fn news_subscore(news_sentiment: f64) -> f64 {
 (50.0 + news_sentiment.clamp(-1.0, 1.0) * 50.0).clamp(0.0, 100.0)
}

/// Result of `bank_risk_score` for one institution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
 pub bank_id: String,
 pub score: f64,
 pub excluded: bool,
 pub reason: Option<String>,
 pub components: BTreeMap<String, f64>,
}

/// Weighted mean of five sub-scores, 0-100, higher is safer.
/// Custody agents are excluded with a sentinel score and reason.
pub fn bank_risk_score(exposure: &BankExposure, inputs: &RiskInputs) -> RiskScore {
 if infer_institution_type(exposure) == InstitutionType::CustodyAgent {
 return RiskScore {
 bank_id: exposure.bank_id.clone(),
 score: CUSTODY_SENTINEL_SCORE,
 excluded: true,
 reason: Some(CUSTODY_SENTINEL_REASON.to_string()),
 components: BTreeMap::new(),
 };
 }

 let rating = rating_subscore(exposure.credit_rating.as_ref());
 let lcr = lcr_subscore(inputs.lcr_pct);
 let insured = insured_subscore(inputs.insured_fraction);
 let spread = spread_subscore(inputs.cds_spread_bps);
 let news = news_subscore(inputs.news_sentiment);

 let score = rating * W_RATING + lcr * W_LCR + insured * W_INSURED + spread * W_SPREAD + news * W_NEWS;

 let mut components = BTreeMap::new();
 components.insert("rating".to_string(), rating);
 components.insert("lcr".to_string(), lcr);
 components.insert("insured".to_string(), insured);
 components.insert("spread".to_string(), spread);
 components.insert("news".to_string(), news);

 RiskScore { bank_id: exposure.bank_id.clone(), score, excluded: false, reason: None, components }
}

/// A liquidity-shock scenario.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StressScenario {
 /// `bank_id -> fraction of that bank's exposure assumed unavailable`.
 pub bank_liquidity_shock: BTreeMap<String, f64>,
 pub daily_runoff_rate: f64,
 pub interest_shock_bps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResult {
 pub unavailable_amount: f64,
 pub run_off_amount: f64,
 pub liquid_assets: f64,
 pub coverage_ratio: f64,
}

fn is_liquid_bucket(bucket: Option<MaturityBucket>) -> bool {
 matches!(bucket, Some(MaturityBucket::Overnight) | Some(MaturityBucket::Within7d))
}

/// Coverage-ratio stress test over a set of exposures.
pub fn run_stress_test(scenario: &StressScenario, exposures: &[BankExposure]) -> StressResult {
 let total: f64 = exposures.iter().map(|e| e.exposure).sum();

 let unavailable_amount: f64 = exposures
.iter()
.map(|e| {
 let shock = scenario.bank_liquidity_shock.get(&e.bank_id).copied().unwrap_or(0.0);
 e.exposure * shock
 })
.sum();

 let run_off_amount = total * scenario.daily_runoff_rate;

 let liquid_assets: f64 = exposures
.iter()
.filter(|e| is_liquid_bucket(e.maturity_bucket))
.map(|e| {
 let shock = scenario.bank_liquidity_shock.get(&e.bank_id).copied().unwrap_or(0.0);
 (1.0 - shock) * e.exposure
 })
.sum();

 let denominator = unavailable_amount + run_off_amount;
 let coverage_ratio = if denominator == 0.0 { 1.0 } else { liquid_assets / denominator };

 StressResult { unavailable_amount, run_off_amount, liquid_assets, coverage_ratio }
}

/// Institutional role, distinct from `InstitutionType` in that it carries
/// the role-weight/target-limit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
 PolicyBank,
 CustodyAgent,
 CommercialBank,
 SecondaryCustodian,
 Broker,
 Other,
}

impl Role {
 pub fn weight(&self) -> f64 {
 match self {
 Role::PolicyBank => 0.5,
 Role::CustodyAgent => 0.01,
 Role::CommercialBank => 1.0,
 Role::SecondaryCustodian => 1.2,
 Role::Broker => 1.6,
 Role::Other => 2.0,
 }
 }

 pub fn target_limit(&self) -> f64 {
 match self {
 Role::PolicyBank => 0.40,
 Role::CustodyAgent => 0.00,
 Role::CommercialBank => 0.15,
 Role::SecondaryCustodian => 0.10,
 Role::Broker => 0.07,
 Role::Other => 0.03,
 }
 }
}

impl From<InstitutionType> for Role {
 fn from(t: InstitutionType) -> Self {
 match t {
 InstitutionType::PolicyBank => Role::PolicyBank,
 InstitutionType::CustodyAgent => Role::CustodyAgent,
 InstitutionType::CommercialBank => Role::CommercialBank,
 InstitutionType::SecondaryCustodian => Role::SecondaryCustodian,
 InstitutionType::Broker => Role::Broker,
 InstitutionType::Other => Role::Other,
 }
 }
}

/// One institution's target allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAllocation {
 pub bank_id: String,
 pub role: Role,
 pub fss: f64,
 pub target_pct: f64,
 pub target_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPlan {
 pub banks: Vec<TargetAllocation>,
 pub custody: Vec<TargetAllocation>,
}

/// Role-weighted target allocation. `fss_by_bank` supplies
/// the 0-100 risk/safety score per bank; missing entries default to 70,
/// a neutral fallback for a bank with no live score.
pub fn compute_target_allocation(exposures: &[BankExposure], fss_by_bank: &BTreeMap<String, f64>, total_reserve: f64) -> AllocationPlan {
 let mut custody = Vec::new();
 let mut pool: Vec<(String, Role, f64, f64)> = Vec::new(); // (bank_id, role, fss, base_weight)

 for exposure in exposures {
 let role: Role = infer_institution_type(exposure).into();
 if role == Role::CustodyAgent {
 custody.push(TargetAllocation { bank_id: exposure.bank_id.clone(), role, fss: 0.0, target_pct: 0.0, target_amount: 0.0 });
 continue;
 }
 let fss = fss_by_bank.get(&exposure.bank_id).copied().unwrap_or(70.0);
 let base_weight = (fss / 100.0) / role.weight();
 pool.push((exposure.bank_id.clone(), role, fss, base_weight));
 }

 let total_base: f64 = pool.iter().map(|(_, _, _, w)| w).sum();
 let banks = if total_base <= 0.0 {
 Vec::new()
 } else {
 pool.into_iter()
.map(|(bank_id, role, fss, base_weight)| {
 let pct = (base_weight / total_base).min(role.target_limit());
 TargetAllocation { bank_id, role, fss, target_pct: pct, target_amount: pct * total_reserve }
 })
.collect()
 };

 AllocationPlan { banks, custody }
}

/// One suggested transfer in a rebalance plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceMove {
 pub from: String,
 pub to: String,
 pub amount: f64,
}

/// Pairs over-allocated sources with under-allocated destinations by
/// amount. Mirrors `compute_rebalance_plan`'s two-pointer
/// greedy match, including the faithful quirk that a destination's
/// remaining need is not carried across different sources — each source
/// drains against each destination's original shortfall independently.
pub fn compute_rebalance_plan(exposures: &[BankExposure], plan: &AllocationPlan) -> Vec<RebalanceMove> {
 let custody_ids: std::collections::BTreeSet<&str> = plan.custody.iter().map(|c| c.bank_id.as_str()).collect();
 let target_by_bank: BTreeMap<&str, f64> = plan.banks.iter().map(|t| (t.bank_id.as_str(), t.target_amount)).collect();

 let mut over = Vec::new();
 let mut under = Vec::new();
 for exposure in exposures {
 if custody_ids.contains(exposure.bank_id.as_str()) {
 continue;
 }
 let target = target_by_bank.get(exposure.bank_id.as_str()).copied().unwrap_or(0.0);
 let diff = exposure.exposure - target;
 if diff > 0.0 {
 over.push((exposure.bank_id.clone(), diff));
 } else if diff < 0.0 {
 under.push((exposure.bank_id.clone(), -diff));
 }
 }

 let mut moves = Vec::new();
 for (src, mut amt_over) in over {
 for (dst, amt_need) in &under {
 if amt_over <= 0.0 {
 break;
 }
 let move_amount = amt_over.min(*amt_need);
 if move_amount <= 0.0 {
 continue;
 }
 moves.push(RebalanceMove { from: src.clone(), to: dst.clone(), amount: move_amount });
 amt_over -= move_amount;
 }
 }
 moves
}

#[cfg(test)]
mod tests {
 use super::*;

 fn exposure(id: &str, amount: f64, rating: CreditRating) -> BankExposure {
 BankExposure {
 bank_id: id.to_string(),
 name: format!("{id} Bank"),
 group_id: None,
 is_policy_bank: false,
 exposure: amount,
 credit_rating: Some(rating),
 maturity_bucket: Some(MaturityBucket::Overnight),
 institution_type: None,
 }
 }

 #[test]
 fn custody_agent_gets_sentinel_score() {
 let custody = BankExposure {
 bank_id: "KSD".into(),
 name: "Custody Depository".into(),
 group_id: None,
 is_policy_bank: false,
 exposure: 100.0,
 credit_rating: None,
 maturity_bucket: None,
 institution_type: None,
 };
 let score = bank_risk_score(&custody, &RiskInputs::default());
 assert!(score.excluded);
 assert_eq!(score.score, CUSTODY_SENTINEL_SCORE);
 }

 #[test]
 fn higher_rating_and_lcr_produce_higher_score() {
 let strong = exposure("A", 100.0, CreditRating::Aaa);
 let weak = exposure("B", 100.0, CreditRating::Ccc);
 let inputs = RiskInputs { lcr_pct: 130.0, insured_fraction: 1.0, cds_spread_bps: 10.0, news_sentiment: 0.5 };
 let strong_score = bank_risk_score(&strong, &inputs);
 let weak_score = bank_risk_score(&weak, &inputs);
 assert!(strong_score.score > weak_score.score);
 }

 #[test]
 fn stress_test_zero_shock_has_full_coverage() {
 let exposures = vec![exposure("A", 1000.0, CreditRating::Aaa)];
 let scenario = StressScenario { bank_liquidity_shock: BTreeMap::new(), daily_runoff_rate: 0.0, interest_shock_bps: 0.0 };
 let result = run_stress_test(&scenario, &exposures);
 assert_eq!(result.coverage_ratio, 1.0);
 assert_eq!(result.liquid_assets, 1000.0);
 }

 #[test]
 fn stress_test_runoff_reduces_coverage_ratio() {
 let exposures = vec![exposure("A", 1000.0, CreditRating::Aaa)];
 let scenario = StressScenario { bank_liquidity_shock: BTreeMap::new(), daily_runoff_rate: 0.1, interest_shock_bps: 0.0 };
 let result = run_stress_test(&scenario, &exposures);
 assert!(result.coverage_ratio < 1.0);
 assert_eq!(result.run_off_amount, 100.0);
 }

 #[test]
 fn target_allocation_caps_at_role_limit() {
 let exposures = vec![exposure("A", 500.0, CreditRating::Aaa)];
 let mut fss = BTreeMap::new();
 fss.insert("A".to_string(), 100.0);
 let plan = compute_target_allocation(&exposures, &fss, 1000.0);
 assert_eq!(plan.banks.len(), 1);
 assert!(plan.banks[0].target_pct <= Role::CommercialBank.target_limit());
 }

 #[test]
 fn custody_entries_get_zero_target() {
 let custody = BankExposure {
 bank_id: "KSD".into(),
 name: "Custody Depository".into(),
 group_id: None,
 is_policy_bank: false,
 exposure: 5000.0,
 credit_rating: None,
 maturity_bucket: None,
 institution_type: None,
 };
 let exposures = vec![custody, exposure("A", 100.0, CreditRating::Aaa)];
 let mut fss = BTreeMap::new();
 fss.insert("A".to_string(), 80.0);
 let plan = compute_target_allocation(&exposures, &fss, 1000.0);
 assert_eq!(plan.custody.len(), 1);
 assert_eq!(plan.custody[0].target_amount, 0.0);
 }

 #[test]
 fn rebalance_plan_moves_amount_from_over_to_under_allocated() {
 let exposures = vec![exposure("A", 900.0, CreditRating::Aaa), exposure("B", 100.0, CreditRating::Aaa)];
 let mut fss = BTreeMap::new();
 fss.insert("A".to_string(), 70.0);
 fss.insert("B".to_string(), 70.0);
 let plan = compute_target_allocation(&exposures, &fss, 1000.0);
 let moves = compute_rebalance_plan(&exposures, &plan);
 assert!(moves.iter().any(|m| m.from == "A"));
 }
}
