//! Declarative reserve exposure policy checks (C6).
//!
//! The policy model is intentionally declarative: limits, multipliers, and
//! bands are data (`PolicyConfig`), not branching logic sprinkled through the
//! checks, in a declarative rule/effect vocabulary similar to
//! `ledger-spec::policy`.

use std::collections::BTreeMap;

use kwon_spec::{BankExposure, CreditRating, InstitutionType, MaturityBucket, PolicyViolation, PolicyViolationType, Severity};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tunable limits and thresholds for every check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
 pub single_limit: f64,
 pub group_limit: f64,
 pub policy_bank_limit: f64,
 pub maturity_bands: BTreeMap<&'static str, (f64, f64)>,
 pub warning_threshold: f64,
 pub critical_threshold: f64,
}

impl Default for PolicyConfig {
 fn default() -> Self {
 let mut maturity_bands = BTreeMap::new();
 maturity_bands.insert("OVERNIGHT", (0.30, 0.40));
 maturity_bands.insert("WITHIN_7D", (0.20, 0.30));
 maturity_bands.insert("WITHIN_1M", (0.20, 0.30));
 maturity_bands.insert("WITHIN_3M", (0.10, 0.20));
 Self {
 single_limit: 0.25,
 group_limit: 0.40,
 policy_bank_limit: 0.30,
 maturity_bands,
 warning_threshold: 0.90,
 critical_threshold: 1.00,
 }
 }
}

/// Severity mapping over a `ratio = share / limit`.
fn severity_for_ratio(ratio: f64, config: &PolicyConfig) -> Option<Severity> {
 if ratio >= config.critical_threshold {
 Some(Severity::Critical)
 } else if ratio >= config.warning_threshold {
 Some(Severity::Warning)
 } else {
 None
 }
}

/// Infers `InstitutionType` from name/id by a fixed keyword rule table.
/// `custody_agent` exposures are excluded from all evaluations
/// downstream of this function.
pub fn infer_institution_type(exposure: &BankExposure) -> InstitutionType {
 if let Some(existing) = exposure.institution_type {
 return existing;
 }
 let haystack = format!("{} {}", exposure.name, exposure.bank_id).to_lowercase();
 if haystack.contains("custody") || haystack.contains("custodian") {
 InstitutionType::CustodyAgent
 } else if exposure.is_policy_bank || haystack.contains("policy bank") || haystack.contains("policybank") {
 InstitutionType::PolicyBank
 } else if haystack.contains("broker") || haystack.contains("securities") {
 InstitutionType::Broker
 } else if haystack.contains("secondary") {
 InstitutionType::SecondaryCustodian
 } else if haystack.contains("bank") {
 InstitutionType::CommercialBank
 } else {
 InstitutionType::Other
 }
}

/// Splits an exposure with unknown or `OVERNIGHT` maturity into the fixed
/// default bucket weights. Returns `(bucket, fraction_of_exposure)` pairs.
pub fn split_maturity(exposure: &BankExposure) -> Vec<(MaturityBucket, f64)> {
 match exposure.maturity_bucket {
 Some(bucket) if bucket != MaturityBucket::Overnight => vec![(bucket, exposure.exposure)],
 _ => MaturityBucket::ALL_SPLIT.iter().map(|(bucket, weight)| (*bucket, exposure.exposure * weight)).collect(),
 }
}

fn exclude_custody(exposures: &[BankExposure]) -> Vec<BankExposure> {
 exposures
.iter()
.filter(|e| infer_institution_type(e) != InstitutionType::CustodyAgent)
.cloned()
.collect()
}

/// Check 1: single-institution exposure limit.
fn check_single_institution(exposures: &[BankExposure], total: f64, config: &PolicyConfig) -> Vec<PolicyViolation> {
 let mut violations = Vec::new();
 for exposure in exposures {
 if total <= 0.0 {
 continue;
 }
 let share = exposure.exposure / total;
 let limit = if exposure.is_policy_bank { config.policy_bank_limit } else { config.single_limit };
 let ratio = share / limit;
 if let Some(severity) = severity_for_ratio(ratio, config) {
 violations.push(PolicyViolation {
 violation_type: PolicyViolationType::ExposureLimit,
 severity,
 code: "SINGLE_INSTITUTION_LIMIT".to_string(),
 message: format!("{} holds {:.2}% of reserves, limit {:.2}%", exposure.name, share * 100.0, limit * 100.0),
 details: json!({
 "bank_id": exposure.bank_id,
 "current": exposure.exposure,
 "share": share,
 "limit": limit,
 "ratio": ratio,
 "excess_amount": (share - limit).max(0.0) * total,
 }),
 });
 }
 }
 violations
}

/// Check 2: aggregate group-level exposure limit.
fn check_group_limit(exposures: &[BankExposure], total: f64, config: &PolicyConfig) -> Vec<PolicyViolation> {
 let mut by_group: BTreeMap<String, f64> = BTreeMap::new();
 for exposure in exposures {
 if let Some(group) = &exposure.group_id {
 *by_group.entry(group.clone()).or_insert(0.0) += exposure.exposure;
 }
 }
 let mut violations = Vec::new();
 for (group, amount) in by_group {
 if total <= 0.0 {
 continue;
 }
 let share = amount / total;
 let ratio = share / config.group_limit;
 if let Some(severity) = severity_for_ratio(ratio, config) {
 violations.push(PolicyViolation {
 violation_type: PolicyViolationType::ExposureLimit,
 severity,
 code: "GROUP_LIMIT".to_string(),
 message: format!("Group {group} holds {:.2}% of reserves, limit {:.2}%", share * 100.0, config.group_limit * 100.0),
 details: json!({
 "group_id": group,
 "current": amount,
 "share": share,
 "limit": config.group_limit,
 "ratio": ratio,
 "excess_amount": (share - config.group_limit).max(0.0) * total,
 }),
 });
 }
 }
 violations
}

/// Check 3: rating-adjusted exposure limit. Missing rating is treated as
/// the most conservative multiplier (`0.50`), same as `CreditRating::Nr`.
fn check_rating_limit(exposures: &[BankExposure], total: f64, config: &PolicyConfig) -> Vec<PolicyViolation> {
 let mut violations = Vec::new();
 for exposure in exposures {
 if total <= 0.0 {
 continue;
 }
 let multiplier = exposure.credit_rating.as_ref().map(CreditRating::multiplier).unwrap_or(0.50);
 let base_limit = if exposure.is_policy_bank { config.policy_bank_limit } else { config.single_limit };
 let adjusted_limit = base_limit * multiplier;
 let share = exposure.exposure / total;
 let ratio = share / adjusted_limit;
 if let Some(severity) = severity_for_ratio(ratio, config) {
 violations.push(PolicyViolation {
 violation_type: PolicyViolationType::CreditRatingLimit,
 severity,
 code: "RATING_ADJUSTED_LIMIT".to_string(),
 message: format!("{} exceeds its rating-adjusted limit ({:.2}%)", exposure.name, adjusted_limit * 100.0),
 details: json!({
 "bank_id": exposure.bank_id,
 "rating_multiplier": multiplier,
 "current": exposure.exposure,
 "share": share,
 "limit": adjusted_limit,
 "ratio": ratio,
 "excess_amount": (share - adjusted_limit).max(0.0) * total,
 }),
 });
 }
 }
 violations
}

/// Check 4: maturity bucket distribution vs. the configured target bands.
fn check_maturity_distribution(exposures: &[BankExposure], total: f64, config: &PolicyConfig) -> Vec<PolicyViolation> {
 let mut by_bucket: BTreeMap<&'static str, f64> = BTreeMap::new();
 for exposure in exposures {
 for (bucket, amount) in split_maturity(exposure) {
 *by_bucket.entry(bucket.label()).or_insert(0.0) += amount;
 }
 }

 let mut violations = Vec::new();
 for (label, (min_pct, max_pct)) in &config.maturity_bands {
 if total <= 0.0 {
 continue;
 }
 let amount = by_bucket.get(label).copied().unwrap_or(0.0);
 let share = amount / total;

 if share > *max_pct {
 let ratio = share / max_pct;
 if let Some(severity) = severity_for_ratio(ratio, config) {
 violations.push(maturity_violation(label, "OVER", share, *max_pct, ratio, severity));
 }
 } else if share < *min_pct {
 let ratio = min_pct / share.max(1e-9);
 let escalated = share < min_pct * config.warning_threshold;
 let severity = if escalated { Severity::Critical } else { Severity::Warning };
 violations.push(maturity_violation(label, "UNDER", share, *min_pct, ratio, severity));
 }
 }
 violations
}

fn maturity_violation(label: &str, direction: &str, share: f64, bound: f64, ratio: f64, severity: Severity) -> PolicyViolation {
 PolicyViolation {
 violation_type: PolicyViolationType::MaturityDistribution,
 severity,
 code: format!("MATURITY_{direction}_{label}"),
 message: format!("{label} bucket is {direction} target ({:.2}% vs {:.2}%)", share * 100.0, bound * 100.0),
 details: json!({
 "bucket": label,
 "direction": direction,
 "share": share,
 "bound": bound,
 "ratio": ratio,
 }),
 }
}

/// Aggregate policy report (`{violations, highest_level, summary}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyReport {
 pub violations: Vec<PolicyViolation>,
 pub highest_level: Severity,
 pub summary_by_type: BTreeMap<String, usize>,
 pub summary_by_level: BTreeMap<String, usize>,
}

/// Runs every check over `exposures` after normalization (custody exclusion,
/// maturity splitting is applied per-check as needed).
pub fn evaluate(exposures: &[BankExposure], config: &PolicyConfig) -> PolicyReport {
 let evaluable = exclude_custody(exposures);
 let total: f64 = evaluable.iter().map(|e| e.exposure).sum();

 let mut violations = Vec::new();
 violations.extend(check_single_institution(&evaluable, total, config));
 violations.extend(check_group_limit(&evaluable, total, config));
 violations.extend(check_rating_limit(&evaluable, total, config));
 violations.extend(check_maturity_distribution(&evaluable, total, config));

 let highest_level = violations.iter().map(|v| v.severity).max().unwrap_or(Severity::Ok);

 let mut summary_by_type: BTreeMap<String, usize> = BTreeMap::new();
 let mut summary_by_level: BTreeMap<String, usize> = BTreeMap::new();
 for violation in &violations {
 *summary_by_type.entry(format!("{:?}", violation.violation_type)).or_insert(0) += 1;
 *summary_by_level.entry(format!("{:?}", violation.severity)).or_insert(0) += 1;
 }

 PolicyReport { violations, highest_level, summary_by_type, summary_by_level }
}

/// Deterministic rebalancing suggestion, one per CRITICAL/actionable violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceSuggestion {
 pub action: RebalanceAction,
 pub bank_id: Option<String>,
 pub bucket: Option<String>,
 pub direction: Option<String>,
 pub amount: f64,
 pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceAction {
 ExposureReduction,
 MaturityAdjustment,
}

/// Rule-based generator: no optimization, no randomness.
pub fn suggest_rebalancing(report: &PolicyReport) -> Vec<RebalanceSuggestion> {
 report
.violations
.iter()
.filter_map(|v| match (v.violation_type, v.severity) {
 (PolicyViolationType::ExposureLimit | PolicyViolationType::CreditRatingLimit, Severity::Critical) => Some(RebalanceSuggestion {
 action: RebalanceAction::ExposureReduction,
 bank_id: v.details.get("bank_id").and_then(|x| x.as_str()).map(str::to_string),
 bucket: None,
 direction: None,
 amount: v.details.get("excess_amount").and_then(|x| x.as_f64()).unwrap_or(0.0),
 reason: v.message.clone(),
 }),
 (PolicyViolationType::MaturityDistribution, _) => Some(RebalanceSuggestion {
 action: RebalanceAction::MaturityAdjustment,
 bank_id: None,
 bucket: v.details.get("bucket").and_then(|x| x.as_str()).map(str::to_string),
 direction: v.details.get("direction").and_then(|x| x.as_str()).map(str::to_string),
 amount: 0.0,
 reason: v.message.clone(),
 }),
 _ => None,
 })
.collect()
}

#[cfg(test)]
mod tests {
 use super::*;

 fn exposure(id: &str, amount: f64, rating: Option<CreditRating>, policy_bank: bool) -> BankExposure {
 BankExposure {
 bank_id: id.to_string(),
 name: format!("{id} Bank"),
 group_id: None,
 is_policy_bank: policy_bank,
 exposure: amount,
 credit_rating: rating,
 maturity_bucket: Some(MaturityBucket::Overnight),
 institution_type: None,
 }
 }

 #[test]
 fn single_institution_over_limit_is_critical() {
 let exposures = vec![exposure("A", 600.0, Some(CreditRating::Aaa), false), exposure("B", 400.0, Some(CreditRating::Aaa), false)];
 let report = evaluate(&exposures, &PolicyConfig::default());
 assert_eq!(report.highest_level, Severity::Critical);
 assert!(report.violations.iter().any(|v| v.code == "SINGLE_INSTITUTION_LIMIT"));
 }

 #[test]
 fn custody_agents_are_excluded_from_the_exposure_total() {
 let custody = exposure("Custody Corp", 5000.0, Some(CreditRating::Aaa), false);
 let mut exposures = vec![custody];
 for i in 0..5 {
 exposures.push(exposure(&format!("Bank{i}"), 20.0, Some(CreditRating::Aaa), false));
 }
 let report = evaluate(&exposures, &PolicyConfig::default());
 assert!(report.violations.is_empty(), "each remaining bank holds 20% of the post-exclusion total, under the 25% limit");
 assert!(!report.violations.iter().any(|v| v.details.get("bank_id").and_then(|x| x.as_str()) == Some("Custody Corp")));
 }

 #[test]
 fn maturity_under_allocation_escalates_to_critical_when_far_below_band() {
 let exposures = vec![BankExposure {
 bank_id: "A".into(),
 name: "A Bank".into(),
 group_id: None,
 is_policy_bank: false,
 exposure: 100.0,
 credit_rating: Some(CreditRating::Aaa),
 maturity_bucket: Some(MaturityBucket::Within3m),
 institution_type: None,
 }];
 let report = evaluate(&exposures, &PolicyConfig::default());
 assert!(report.violations.iter().any(|v| v.violation_type == PolicyViolationType::MaturityDistribution && v.code.starts_with("MATURITY_UNDER_OVERNIGHT")));
 }

 #[test]
 fn rebalancing_emits_exposure_reduction_for_critical_exposure() {
 let exposures = vec![exposure("A", 900.0, Some(CreditRating::Aaa), false), exposure("B", 100.0, Some(CreditRating::Aaa), false)];
 let report = evaluate(&exposures, &PolicyConfig::default());
 let suggestions = suggest_rebalancing(&report);
 assert!(suggestions.iter().any(|s| s.action == RebalanceAction::ExposureReduction));
 }
}
