//! Monthly Compliance Orchestrator (C8): a plain graph data
//! structure over `MonthlyState`, rather than a decorator-declared
//! framework graph of nodes and conditional edges.
//! Nodes are pure `(state) -> state` functions; edges are predicate-guarded
//! routing decided by this module's `route_*` functions.
//!
//! Stage bodies, grading, and consistency rules follow the five-dimension
//! evaluation contract (collateral/peg/disclosure/liquidity/por), with
//! the human-review interrupt/notify shape carried over from the
//! orchestrator's `run`/`resume` pair.

use std::collections::BTreeMap;

use chrono::Utc;
use kwon_adapters::MonthlyMetrics;
use kwon_spec::{ConsistencyResult, ConsistencyStatus, DataQuality, DimensionEval, Grade, HumanDecision, MonthlyState, Summary};
use serde_json::json;

/// Upper bound on total stage executions within one `run`/`resume` call,
/// guarding against state oscillation between the consistency-recheck
/// stages.
pub const MAX_GRAPH_STEPS: u32 = 100;

const COLLATERAL_A: f64 = 1.15;
const COLLATERAL_B: f64 = 1.10;
const COLLATERAL_C: f64 = 1.03;

const PEG_A: f64 = 0.002;
const PEG_B: f64 = 0.005;
const PEG_C: f64 = 0.010;

const LIQUIDITY_A: f64 = 0.30;
const LIQUIDITY_B: f64 = 0.20;
const LIQUIDITY_C: f64 = 0.10;

const POR_FAILURE_CRITICAL: f64 = 0.01;
const POR_FAILURE_WARNING: f64 = 0.001;

/// Every node in the graph, used both as an execution cursor and as the
/// `next_step` persisted in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
 LoadPeriodData,
 DataQualityCheck,
 EvalCollateral,
 EvalPeg,
 EvalDisclosure,
 EvalLiquidity,
 EvalPor,
 CrossCheckConsistency,
 SummarizeConclusion,
 GenerateReport,
 HumanReview,
 NotifyApproved,
 DataQualityFail,
 Done,
}

fn grade_from_threshold(value: f64, a: f64, b: f64, c: f64, higher_is_better: bool) -> Grade {
 if higher_is_better {
 if value >= a {
 Grade::A
 } else if value >= b {
 Grade::B
 } else if value >= c {
 Grade::C
 } else {
 Grade::D
 }
 } else if value <= a {
 Grade::A
 } else if value <= b {
 Grade::B
 } else if value <= c {
 Grade::C
 } else {
 Grade::D
 }
}

/// Seeds a new workflow instance's initial state. `raw_data` is the
/// `MonthlyMetrics` snapshot already fetched via the `MetricSource`
/// adapter (C10); this function itself performs no I/O.
pub fn load_period_data(period: &str, metrics: &MonthlyMetrics, max_revisions: u32, max_retries_data_load: u32) -> MonthlyState {
 let mut retry_counts = BTreeMap::new();
 retry_counts.insert("data_load".to_string(), 0u32);
 let mut max_retries = BTreeMap::new();
 max_retries.insert("data_load".to_string(), max_retries_data_load);

 MonthlyState {
 period: period.to_string(),
 raw_data: serde_json::to_value(metrics).unwrap_or(serde_json::Value::Null),
 data_quality: None,
 collateral: None,
 peg: None,
 disclosure: None,
 liquidity: None,
 por: None,
 consistency: None,
 summary: None,
 report_path: None,
 human_decision: None,
 human_feedback: None,
 revision_count: 0,
 max_revisions,
 retry_counts,
 max_retries,
 }
}

fn metrics_from_raw(state: &MonthlyState) -> Option<MonthlyMetrics> {
 serde_json::from_value(state.raw_data.clone()).ok()
}

/// (1-alpha) Data quality gate; increments the `data_load` retry counter on
/// a recoverable gap, without exceeding `max_retries.data_load`.
pub fn data_quality_check(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 let Some(metrics) = metrics_from_raw(state) else {
 next.data_quality = Some(DataQuality::Fail);
 return next;
 };

 let coverage = metrics.days_covered as f64 / (metrics.total_days.max(1) as f64);
 let collateral_samples = metrics.sample_counts.get("collateral").copied().unwrap_or(0);
 let sample_size_ok = collateral_samples >= 100;
 let completeness = ["collateral", "peg", "liquidity"].iter().all(|cat| metrics.sample_counts.get(*cat).copied().unwrap_or(0) > 0);
 let recent_data = metrics.last_update_hours_ago < 24.0;

 let mut critical_issues = Vec::new();
 if coverage < 0.8 {
 critical_issues.push("coverage");
 }
 if !sample_size_ok {
 critical_issues.push("sample_size_ok");
 }
 if !completeness {
 critical_issues.push("completeness");
 }
 if !recent_data {
 critical_issues.push("recent_data");
 }

 let has_critical_gap = !critical_issues.is_empty();
 let current_retries = state.retry_counts.get("data_load").copied().unwrap_or(0);
 let max_retries = state.max_retries.get("data_load").copied().unwrap_or(3);
 let max_retry_exceeded = has_critical_gap && current_retries >= max_retries;

 next.data_quality = Some(if max_retry_exceeded { DataQuality::Fail } else if has_critical_gap { DataQuality::Retry } else { DataQuality::Ok });

 if has_critical_gap && !max_retry_exceeded {
 next.retry_counts.insert("data_load".to_string(), current_retries + 1);
 }
 next
}

pub fn route_after_data_quality(state: &MonthlyState) -> Stage {
 match state.data_quality {
 Some(DataQuality::Fail) => Stage::DataQualityFail,
 Some(DataQuality::Retry) => Stage::LoadPeriodData,
 _ => Stage::EvalCollateral,
 }
}

/// (2) Collateral ratio evaluation. A fallback `{grade: F, fallback: true}`
/// result is returned instead of propagating an error.
pub fn eval_collateral_monthly(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 next.collateral = Some(match metrics_from_raw(state) {
 Some(m) => {
 let grade = grade_from_threshold(m.avg_collateral_ratio, COLLATERAL_A, COLLATERAL_B, COLLATERAL_C, true);
 DimensionEval { grade, metrics: json!({"avg_ratio": m.avg_collateral_ratio, "min_ratio": m.min_collateral_ratio}), error: None, fallback: false }
 }
 None => DimensionEval { grade: Grade::F, metrics: serde_json::Value::Null, error: Some("raw_data missing for collateral evaluation".to_string()), fallback: true },
 });
 next
}

/// (3) Peg deviation evaluation.
pub fn eval_peg_monthly(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 next.peg = Some(match metrics_from_raw(state) {
 Some(m) => {
 let grade = grade_from_threshold(m.avg_peg_deviation, PEG_A, PEG_B, PEG_C, false);
 DimensionEval { grade, metrics: json!({"avg_depeg": m.avg_peg_deviation, "alert_count": m.peg_alert_count}), error: None, fallback: false }
 }
 None => DimensionEval { grade: Grade::F, metrics: serde_json::Value::Null, error: Some("raw_data missing for peg evaluation".to_string()), fallback: true },
 });
 next
}

/// (4) Disclosure evaluation. The production data contract for
/// disclosures is out of scope; this always reports the
/// "all disclosures submitted on time" fixture result.
pub fn eval_disclosure_monthly(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 next.disclosure = Some(DimensionEval {
 grade: Grade::A,
 metrics: json!({"late_reports": 0, "missing_reports": 0, "notes": "All disclosures submitted on time."}),
 error: None,
 fallback: false,
 });
 next
}

/// (5) Liquidity ratio evaluation.
pub fn eval_liquidity_monthly(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 next.liquidity = Some(match metrics_from_raw(state) {
 Some(m) => {
 let grade = grade_from_threshold(m.avg_liquidity_ratio, LIQUIDITY_A, LIQUIDITY_B, LIQUIDITY_C, true);
 DimensionEval { grade, metrics: json!({"avg_liquidity_ratio": m.avg_liquidity_ratio}), error: None, fallback: false }
 }
 None => DimensionEval { grade: Grade::F, metrics: serde_json::Value::Null, error: Some("raw_data missing for liquidity evaluation".to_string()), fallback: true },
 });
 next
}

/// (6) Proof-of-Reserve failure-rate evaluation.
pub fn eval_por_monthly(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 next.por = Some(match metrics_from_raw(state) {
 Some(m) => {
 let rate = m.avg_por_failure_rate;
 let grade = if rate > POR_FAILURE_CRITICAL { Grade::D } else if rate > POR_FAILURE_WARNING { Grade::B } else { Grade::A };
 DimensionEval { grade, metrics: json!({"avg_failure_rate": rate}), error: None, fallback: false }
 }
 None => DimensionEval { grade: Grade::F, metrics: serde_json::Value::Null, error: Some("raw_data missing for PoR evaluation".to_string()), fallback: true },
 });
 next
}

/// (6-alpha) Fixed conflict rules between dimension grades.
pub fn cross_check_consistency(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 let collateral = state.collateral.as_ref().map(|d| d.grade);
 let liquidity = state.liquidity.as_ref().map(|d| d.grade);
 let peg = state.peg.as_ref().map(|d| d.grade);
 let por = state.por.as_ref().map(|d| d.grade);

 let mut issues = Vec::new();
 if collateral == Some(Grade::A) && liquidity == Some(Grade::D) {
 issues.push("collateral_A_but_liquidity_D".to_string());
 }
 if peg == Some(Grade::D) && collateral == Some(Grade::A) && liquidity == Some(Grade::A) {
 issues.push("peg_D_but_others_A".to_string());
 }
 if por == Some(Grade::D) && [collateral, liquidity, peg].iter().all(|g| *g == Some(Grade::A)) {
 issues.push("por_D_but_risks_A".to_string());
 }

 let status = if issues.is_empty() {
 ConsistencyStatus::Ok
 } else if issues.iter().any(|i| i.contains("liquidity")) {
 ConsistencyStatus::RecheckLiquidity
 } else {
 ConsistencyStatus::RecheckCollateral
 };

 next.consistency = Some(ConsistencyResult { status, issues });
 next
}

pub fn route_after_consistency(state: &MonthlyState) -> Stage {
 match state.consistency.as_ref().map(|c| c.status) {
 Some(ConsistencyStatus::RecheckCollateral) => Stage::EvalCollateral,
 Some(ConsistencyStatus::RecheckLiquidity) => Stage::EvalLiquidity,
 _ => Stage::SummarizeConclusion,
 }
}

/// (7) Final grade + revise-loop bookkeeping.
pub fn summarize_conclusion(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 let human_feedback = state.human_feedback.as_deref().unwrap_or("").trim().to_string();

 if state.human_decision == Some(HumanDecision::Revise) && state.revision_count > state.max_revisions {
 next.summary = Some(Summary {
 final_grade: Grade::Pending,
 key_points: vec![
 "Automatic revision limit (max_revisions) reached.".to_string(),
 "Further changes require direct human review.".to_string(),
 ],
 revision_status: Some("limit_reached".to_string()),
 });
 return next;
 }

 let grades = [
 state.collateral.as_ref().map(|d| d.grade).unwrap_or(Grade::C),
 state.peg.as_ref().map(|d| d.grade).unwrap_or(Grade::C),
 state.disclosure.as_ref().map(|d| d.grade).unwrap_or(Grade::C),
 state.liquidity.as_ref().map(|d| d.grade).unwrap_or(Grade::C),
 state.por.as_ref().map(|d| d.grade).unwrap_or(Grade::C),
 ];
 let final_grade = Grade::worst(grades).unwrap_or(Grade::C);

 let mut key_points = vec![
 format!("Collateral grade: {:?}", grades[0]),
 format!("Peg grade: {:?}", grades[1]),
 format!("Disclosure grade: {:?}", grades[2]),
 format!("Liquidity grade: {:?}", grades[3]),
 format!("PoR grade: {:?}", grades[4]),
 format!("Consistency status: {:?}", state.consistency.as_ref().map(|c| c.status)),
 ];
 if !human_feedback.is_empty() {
 key_points.push(format!("[Reviewer Feedback] {human_feedback}"));
 }

 next.summary = Some(Summary {
 final_grade,
 key_points,
 revision_status: Some(if state.human_decision == Some(HumanDecision::Revise) { "revised".to_string() } else { "initial".to_string() }),
 });
 next
}

/// (8) Deterministic artifact path; the document is written by
/// `report::write_report` (C9), not by this pure stage.
pub fn stage_report_path(period: &str) -> String {
 format!("REP-{period}.docx")
}

/// Routes `human_review`'s outcome once a decision has been recorded.
/// `revision_count` is incremented here, once per revise.
pub fn route_after_human_review(state: &MonthlyState) -> (Stage, MonthlyState) {
 let mut next = state.clone();
 match state.human_decision {
 Some(HumanDecision::Approve) | Some(HumanDecision::ApproveWithComment) => (Stage::NotifyApproved, next),
 Some(HumanDecision::Revise) => {
 next.revision_count += 1;
 (Stage::SummarizeConclusion, next)
 }
 _ => (Stage::NotifyApproved, next),
 }
}

/// Terminal node for a data-quality failure: synthesizes a summary instead
/// of crashing the graph.
pub fn data_quality_fail(state: &MonthlyState) -> MonthlyState {
 let mut next = state.clone();
 next.summary = Some(Summary {
 final_grade: Grade::D,
 key_points: vec!["DATA_QUALITY_FAILURE: max retries exceeded during data loading".to_string()],
 revision_status: None,
 });
 next.report_path.get_or_insert_with(String::new());
 next
}

/// Drives the non-interrupt section of the graph starting at `start`,
/// stopping when it reaches `human_review`, a terminal node, or
/// `MAX_GRAPH_STEPS` total transitions.
pub fn advance(mut state: MonthlyState, mut stage: Stage, metrics_for_retry: Option<&MonthlyMetrics>) -> (MonthlyState, Stage) {
 for _ in 0..MAX_GRAPH_STEPS {
 stage = match stage {
 Stage::LoadPeriodData => {
 if let Some(m) = metrics_for_retry {
 state = load_period_data(&state.period, m, state.max_revisions, state.max_retries.get("data_load").copied().unwrap_or(3));
 }
 Stage::DataQualityCheck
 }
 Stage::DataQualityCheck => {
 state = data_quality_check(&state);
 route_after_data_quality(&state)
 }
 Stage::EvalCollateral => {
 state = eval_collateral_monthly(&state);
 Stage::EvalPeg
 }
 Stage::EvalPeg => {
 state = eval_peg_monthly(&state);
 Stage::EvalDisclosure
 }
 Stage::EvalDisclosure => {
 state = eval_disclosure_monthly(&state);
 Stage::EvalLiquidity
 }
 Stage::EvalLiquidity => {
 state = eval_liquidity_monthly(&state);
 Stage::EvalPor
 }
 Stage::EvalPor => {
 state = eval_por_monthly(&state);
 Stage::CrossCheckConsistency
 }
 Stage::CrossCheckConsistency => {
 state = cross_check_consistency(&state);
 route_after_consistency(&state)
 }
 Stage::SummarizeConclusion => {
 state = summarize_conclusion(&state);
 let limit_reached = state.summary.as_ref().and_then(|s| s.revision_status.as_deref()) == Some("limit_reached");
 if limit_reached {
 Stage::NotifyApproved
 } else {
 Stage::GenerateReport
 }
 }
 Stage::GenerateReport => {
 state.report_path = Some(stage_report_path(&state.period));
 Stage::HumanReview
 }
 Stage::HumanReview | Stage::DataQualityFail | Stage::NotifyApproved | Stage::Done => return (state, stage),
 };
 if stage == Stage::HumanReview || stage == Stage::DataQualityFail {
 return (state, stage);
 }
 }
 (state, stage)
}

#[cfg(test)]
mod tests {
 use super::*;

 fn healthy_metrics() -> MonthlyMetrics {
 let mut sample_counts = BTreeMap::new();
 sample_counts.insert("collateral".to_string(), 120);
 sample_counts.insert("peg".to_string(), 120);
 sample_counts.insert("liquidity".to_string(), 120);
 MonthlyMetrics {
 avg_collateral_ratio: 1.20,
 min_collateral_ratio: 1.10,
 avg_peg_deviation: 0.001,
 peg_alert_count: 0,
 avg_liquidity_ratio: 0.35,
 avg_por_failure_rate: 0.0,
 days_covered: 30,
 total_days: 30,
 last_update_hours_ago: 1.0,
 sample_counts,
 }
 }

 #[test]
 fn happy_path_reaches_human_review_with_grade_a() {
 let metrics = healthy_metrics();
 let state = load_period_data("2026-06", &metrics, 3, 3);
 let (final_state, stage) = advance(state, Stage::LoadPeriodData, Some(&metrics));
 assert_eq!(stage, Stage::HumanReview);
 assert_eq!(final_state.summary.unwrap().final_grade, Grade::A);
 assert!(final_state.report_path.is_some());
 }

 #[test]
 fn poor_collateral_drives_worst_grade_down() {
 let mut metrics = healthy_metrics();
 metrics.avg_collateral_ratio = 0.90;
 let state = load_period_data("2026-06", &metrics, 3, 3);
 let (final_state, stage) = advance(state, Stage::LoadPeriodData, Some(&metrics));
 assert_eq!(stage, Stage::HumanReview);
 assert_eq!(final_state.summary.unwrap().final_grade, Grade::D);
 }

 #[test]
 fn stale_data_retries_then_fails_after_max_retries() {
 let mut metrics = healthy_metrics();
 metrics.last_update_hours_ago = 200.0;
 let mut state = load_period_data("2026-06", &metrics, 3, 2);
 let mut stage = Stage::LoadPeriodData;
 loop {
 let (next_state, next_stage) = advance(state, stage, Some(&metrics));
 state = next_state;
 stage = next_stage;
 if stage == Stage::DataQualityFail || stage == Stage::HumanReview {
 break;
 }
 }
 assert_eq!(stage, Stage::DataQualityFail);
 assert_eq!(state.retry_counts.get("data_load").copied(), Some(2));
 }

 #[test]
 fn consistency_conflict_routes_back_to_collateral_eval() {
 let mut state = load_period_data("2026-06", &healthy_metrics(), 3, 3);
 state.collateral = Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false });
 state.liquidity = Some(DimensionEval { grade: Grade::D, metrics: serde_json::Value::Null, error: None, fallback: false });
 state.peg = Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false });
 state.por = Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false });
 state.disclosure = Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false });
 let checked = cross_check_consistency(&state);
 assert_eq!(route_after_consistency(&checked), Stage::EvalLiquidity);
 }

 #[test]
 fn revise_within_limit_still_regenerates_summary() {
 // `revision_count` is incremented by `route_after_human_review` before
 // `summarize_conclusion` runs, so a count equal to `max_revisions` is
 // still a successful revise.
 let mut state = load_period_data("2026-06", &healthy_metrics(), 3, 3);
 state.revision_count = 3;
 state.human_decision = Some(HumanDecision::Revise);
 let summarized = summarize_conclusion(&state);
 assert_eq!(summarized.summary.as_ref().unwrap().revision_status.as_deref(), Some("revised"));
 }

 #[test]
 fn revise_limit_reached_yields_pending_grade() {
 let mut state = load_period_data("2026-06", &healthy_metrics(), 3, 3);
 state.revision_count = 4;
 state.human_decision = Some(HumanDecision::Revise);
 let summarized = summarize_conclusion(&state);
 assert_eq!(summarized.summary.as_ref().unwrap().revision_status.as_deref(), Some("limit_reached"));
 assert_eq!(summarized.summary.as_ref().unwrap().final_grade, Grade::Pending);
 }

 #[test]
 fn three_successive_revises_all_succeed_then_fourth_hits_limit() {
 let mut state = load_period_data("2026-06", &healthy_metrics(), 3, 3);
 for expected_count in 1..=3 {
 let (stage, routed) = route_after_human_review(&MonthlyState { human_decision: Some(HumanDecision::Revise), ..state.clone() });
 assert_eq!(stage, Stage::SummarizeConclusion);
 assert_eq!(routed.revision_count, expected_count);
 state = summarize_conclusion(&routed);
 assert_eq!(state.summary.as_ref().unwrap().revision_status.as_deref(), Some("revised"));
 }

 let (stage, routed) = route_after_human_review(&MonthlyState { human_decision: Some(HumanDecision::Revise), ..state.clone() });
 assert_eq!(stage, Stage::SummarizeConclusion);
 assert_eq!(routed.revision_count, 4);
 let summarized = summarize_conclusion(&routed);
 assert_eq!(summarized.summary.as_ref().unwrap().revision_status.as_deref(), Some("limit_reached"));
 assert_eq!(summarized.summary.as_ref().unwrap().final_grade, Grade::Pending);
 }
}
