//! Data model entities. Storage choice is unconstrained here;
//! `kwon-core::store` maps these 1:1 onto SQL tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of a single on-chain transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
 /// Unique; the transfer's transaction hash.
 pub event_id: String,
 pub block_number: i64,
 pub timestamp: DateTime<Utc>,
 pub from: String,
 pub to: String,
 pub contract_address: Option<String>,
 /// Decimal amount, already scaled by token decimals.
 pub amount: f64,
 /// Verbatim upstream payload.
 pub raw_json: serde_json::Value,
 /// Hex lowercase, even length, SHA-256 over canonical JSON of a fixed subset.
 pub details_hash: Option<String>,
}

/// Per-source ingestion checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
 pub source: String,
 pub last_block: i64,
 pub updated_at: DateTime<Utc>,
}

/// An immutable set of event leaves committed to one Merkle root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleBatch {
 /// Monotonically generated timestamp string (`YYYYMMDDTHHMMSSffffffZ`).
 pub batch_id: String,
 pub merkle_root: String,
 pub leaf_count: i64,
 pub created_at: DateTime<Utc>,
 pub anchored_tx: Option<String>,
}

/// Side of a Merkle proof sibling relative to the node being hashed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofPosition {
 L,
 R,
}

/// A single sibling hash recorded while walking from leaf to root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofNode {
 pub pos: ProofPosition,
 pub hash: String,
}

/// Inclusion witness for one event in one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProof {
 /// Unique across proofs; one proof per event.
 pub event_id: String,
 pub batch_id: String,
 pub leaf_index: i64,
 /// Ordered sibling nodes from leaf to root.
 pub proof_path: Vec<ProofNode>,
}

/// Status of publishing a batch root to an external ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
 Anchored,
 NotAnchored,
 Pending,
}

/// Record of publishing a batch root to an external ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
 pub batch_id: String,
 pub chain: String,
 pub tx_hash: String,
 pub block_number: Option<i64>,
 pub status: AnchorStatus,
 /// Set-once; never overwritten once present.
 pub anchored_at: Option<DateTime<Utc>>,
}

/// External credit rating, coarsened to the multiplier bands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum CreditRating {
 Aaa,
 #[serde(rename = "AA+")]
 AaPlus,
 Aa,
 #[serde(rename = "AA-")]
 AaMinus,
 #[serde(rename = "A+")]
 APlus,
 A,
 #[serde(rename = "A-")]
 AMinus,
 #[serde(rename = "BBB+")]
 BbbPlus,
 Bbb,
 Bb,
 B,
 Ccc,
 D,
 /// Not rated.
 Nr,
}

impl CreditRating {
 /// Multiplier applied to the institution's base exposure limit.
 pub fn multiplier(&self) -> f64 {
 match self {
 CreditRating::Aaa => 1.00,
 CreditRating::AaPlus | CreditRating::Aa | CreditRating::AaMinus => 0.90,
 CreditRating::APlus | CreditRating::A => 0.70,
 _ => 0.50,
 }
 }
}

/// Maturity bucket for a reserve placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaturityBucket {
 Overnight,
 Within7d,
 Within1m,
 Within3m,
 Longer,
}

impl MaturityBucket {
 pub const ALL_SPLIT: [(MaturityBucket, f64); 4] = [
 (MaturityBucket::Overnight, 0.80),
 (MaturityBucket::Within7d, 0.10),
 (MaturityBucket::Within1m, 0.07),
 (MaturityBucket::Within3m, 0.03),
 ];

 pub fn label(&self) -> &'static str {
 match self {
 MaturityBucket::Overnight => "OVERNIGHT",
 MaturityBucket::Within7d => "WITHIN_7D",
 MaturityBucket::Within1m => "WITHIN_1M",
 MaturityBucket::Within3m => "WITHIN_3M",
 MaturityBucket::Longer => "LONGER",
 }
 }
}

/// Inferred institutional role of a counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionType {
 CommercialBank,
 PolicyBank,
 SecondaryCustodian,
 Broker,
 CustodyAgent,
 Other,
}

/// A single institution's share of reserves at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankExposure {
 pub bank_id: String,
 pub name: String,
 pub group_id: Option<String>,
 pub is_policy_bank: bool,
 pub exposure: f64,
 pub credit_rating: Option<CreditRating>,
 pub maturity_bucket: Option<MaturityBucket>,
 pub institution_type: Option<InstitutionType>,
}

/// Severity grade for a policy finding or alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
 Ok,
 Warning,
 Critical,
}

/// Kind of policy finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum PolicyViolationType {
 ExposureLimit,
 CreditRatingLimit,
 MaturityDistribution,
}

/// Structured policy finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
 #[serde(rename = "type")]
 pub violation_type: PolicyViolationType,
 pub severity: Severity,
 pub code: String,
 pub message: String,
 pub details: serde_json::Value,
}

/// Letter grade used across the five monthly-orchestrator dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
 A,
 B,
 C,
 D,
 F,
 /// Terminal placeholder used only for `RevisionLimitReached`:
 /// not a real grade, never produced by `worst`.
 Pending,
}

impl Grade {
 /// `{A:4,B:3,C:2,D:1,F:0}``Pending` has no rank in
 /// this scheme and is never passed to `worst`.
 pub fn rank(&self) -> u8 {
 match self {
 Grade::A => 4,
 Grade::B => 3,
 Grade::C => 2,
 Grade::D => 1,
 Grade::F => 0,
 Grade::Pending => 0,
 }
 }

 pub fn worst(grades: impl IntoIterator<Item = Grade>) -> Option<Grade> {
 grades.into_iter().min_by_key(|g| g.rank())
 }
}

/// Result of one evaluator stage (`eval_collateral_monthly`, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionEval {
 pub grade: Grade,
 pub metrics: serde_json::Value,
 pub error: Option<String>,
 /// True when this is the degrade-not-crash fallback result.
 pub fallback: bool,
}

/// Outcome of `cross_check_consistency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyStatus {
 Ok,
 RecheckCollateral,
 RecheckLiquidity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyResult {
 pub status: ConsistencyStatus,
 pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
 pub final_grade: Grade,
 pub key_points: Vec<String>,
 /// `"limit_reached"` when `revise` was requested after `max_revisions`.
 pub revision_status: Option<String>,
}

/// The workflow's value-object carried across stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyState {
 pub period: String,
 pub raw_data: serde_json::Value,
 pub data_quality: Option<DataQuality>,
 pub collateral: Option<DimensionEval>,
 pub peg: Option<DimensionEval>,
 pub disclosure: Option<DimensionEval>,
 pub liquidity: Option<DimensionEval>,
 pub por: Option<DimensionEval>,
 pub consistency: Option<ConsistencyResult>,
 pub summary: Option<Summary>,
 pub report_path: Option<String>,
 pub human_decision: Option<HumanDecision>,
 pub human_feedback: Option<String>,
 pub revision_count: u32,
 pub max_revisions: u32,
 pub retry_counts: BTreeMap<String, u32>,
 pub max_retries: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
 Ok,
 Retry,
 Fail,
}

/// Decision returned from a `review/submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanDecision {
 Approve,
 Reject,
 Revise,
 ApproveWithComment,
}

/// Status of an externalized human-review task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanReviewStatus {
 Pending,
 Approved,
 Rejected,
 Revised,
 Completed,
}

/// Externalization of an in-flight workflow awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanReviewTask {
 pub id: i64,
 pub period: String,
 pub status: HumanReviewStatus,
 pub report_path: String,
 pub summary_json: String,
 /// Equals orchestrator `thread_id`.
 pub flow_run_id: String,
 pub checkpoint_id: Option<i64>,
 pub revision_count: u32,
 pub last_decision: Option<HumanDecision>,
 pub reviewer: Option<String>,
 pub comment: Option<String>,
 pub created_at: DateTime<Utc>,
 pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn grade_worst_picks_lowest_rank() {
 let worst = Grade::worst([Grade::A, Grade::B, Grade::A, Grade::D, Grade::A]);
 assert_eq!(worst, Some(Grade::D));
 }

 #[test]
 fn rating_multipliers_match_bands() {
 assert_eq!(CreditRating::Aaa.multiplier(), 1.00);
 assert_eq!(CreditRating::Aa.multiplier(), 0.90);
 assert_eq!(CreditRating::A.multiplier(), 0.70);
 assert_eq!(CreditRating::Nr.multiplier(), 0.50);
 assert_eq!(CreditRating::Ccc.multiplier(), 0.50);
 }
}
