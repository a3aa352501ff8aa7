//! External adapter interfaces: `Notifier`, `AnchorWriter`,
//! `MetricSource`, and `TransferSource`, modeling an abstract HTTP data
//! provider. These are interfaces only;
//! production implementations (SMTP/Slack, a real chain client, DART
//! disclosures, Etherscan) are explicitly out of scope; this crate ships
//! only deterministic mock/fixture implementations used by tests and by
//! `kwond` when no concrete adapter is configured.
#![deny(missing_docs)]

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kwon_spec::{HumanDecision, HumanReviewTask, KwonResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A single raw transfer row as returned by an upstream transfer source,
/// prior to hashing/normalization by the ingestor (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransfer {
 pub hash: String,
 pub block_number: i64,
 pub time_stamp: i64,
 pub from: String,
 pub to: String,
 pub contract_address: Option<String>,
 pub value: String,
 pub token_decimal: u32,
}

/// Abstract upstream transfer-event provider (local full-array backend or
/// paginated remote provider; the mode is configuration, not a different
/// trait).
#[async_trait]
pub trait TransferSource: Send + Sync {
 /// Fetch rows for the given window. An empty result signals "no more
 /// pages" to the ingestor.
 async fn fetch_page(&self, start_block: i64, page: u32, page_size: u32) -> KwonResult<Vec<RawTransfer>>;

 /// Current chain head, used to compute the `SAFE_LAG` cursor on an
 /// empty first page. `None` when the source cannot report a head
 /// (e.g. a local backend with no chain concept).
 async fn chain_head(&self) -> KwonResult<Option<i64>>;
}

/// Fixed, in-memory transfer source for tests: serves pre-baked pages and
/// a fixed chain head.
pub struct FixtureTransferSource {
 pages: Mutex<Vec<Vec<RawTransfer>>>,
 head: Option<i64>,
}

impl FixtureTransferSource {
 pub fn new(pages: Vec<Vec<RawTransfer>>, head: Option<i64>) -> Self {
 Self { pages: Mutex::new(pages), head }
 }
}

#[async_trait]
impl TransferSource for FixtureTransferSource {
 async fn fetch_page(&self, _start_block: i64, page: u32, _page_size: u32) -> KwonResult<Vec<RawTransfer>> {
 let pages = self.pages.lock();
 Ok(pages.get(page as usize - 1).cloned().unwrap_or_default())
 }

 async fn chain_head(&self) -> KwonResult<Option<i64>> {
 Ok(self.head)
 }
}

/// Outcome of publishing a Merkle root to an external ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnchorOutcome {
 pub tx_hash: String,
 pub anchored_at: DateTime<Utc>,
}

/// Publishes a batch's Merkle root to an external ledger.
/// Idempotent per `(batch_id, chain)`.
#[async_trait]
pub trait AnchorWriter: Send + Sync {
 async fn anchor(&self, batch_id: &str, chain: &str) -> KwonResult<AnchorOutcome>;
}

/// Default mock anchor writer: returns a deterministic
/// `{anchor_tx_prefix}{batch_id}` transaction id.
pub struct MockAnchorWriter {
 prefix: String,
}

impl MockAnchorWriter {
 pub fn new(prefix: impl Into<String>) -> Self {
 Self { prefix: prefix.into() }
 }
}

impl Default for MockAnchorWriter {
 fn default() -> Self {
 Self::new("mock-")
 }
}

#[async_trait]
impl AnchorWriter for MockAnchorWriter {
 async fn anchor(&self, batch_id: &str, _chain: &str) -> KwonResult<AnchorOutcome> {
 Ok(AnchorOutcome { tx_hash: format!("{}{}", self.prefix, batch_id), anchored_at: Utc::now() })
 }
}

/// Notifies an external channel about orchestrator events.
/// Both methods must be idempotent (per `task_id`+`decision` for
/// `notify_decision`).
#[async_trait]
pub trait Notifier: Send + Sync {
 async fn notify_human_review(&self, task: &HumanReviewTask, summary: &serde_json::Value, report_url: &str) -> KwonResult<()>;

 async fn notify_decision(&self, task_id: i64, period: &str, decision: HumanDecision, comment: Option<&str>, report_path: &str) -> KwonResult<()>;
}

/// Notifier that drops every notification; used in tests and as the
/// gateway's default when no concrete transport (Slack/email) is wired up.
#[derive(Default)]
pub struct NullNotifier {
 sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for NullNotifier {
 async fn notify_human_review(&self, task: &HumanReviewTask, _summary: &serde_json::Value, _report_url: &str) -> KwonResult<()> {
 self.sent.lock().push(format!("human_review:{}", task.id));
 tracing::info!(task_id = task.id, period = %task.period, "human review notification (no-op transport)");
 Ok(())
 }

 async fn notify_decision(&self, task_id: i64, period: &str, decision: HumanDecision, _comment: Option<&str>, _report_path: &str) -> KwonResult<()> {
 let key = format!("decision:{task_id}:{decision:?}");
 let mut sent = self.sent.lock();
 if sent.contains(&key) {
 return Ok(());
 }
 sent.push(key);
 tracing::info!(task_id, period, ?decision, "decision notification (no-op transport)");
 Ok(())
 }
}

/// Monthly metric aggregates for a `period`, read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyMetrics {
 pub avg_collateral_ratio: f64,
 pub min_collateral_ratio: f64,
 pub avg_peg_deviation: f64,
 pub peg_alert_count: u32,
 pub avg_liquidity_ratio: f64,
 pub avg_por_failure_rate: f64,
 pub days_covered: u32,
 pub total_days: u32,
 pub last_update_hours_ago: f64,
 pub sample_counts: BTreeMap<String, u32>,
}

/// Read-only provider of monthly metric aggregates.
#[async_trait]
pub trait MetricSource: Send + Sync {
 async fn metrics_for_period(&self, period: &str) -> KwonResult<MonthlyMetrics>;
}

/// Fixed metric source, used in tests and as a development default; the
/// production data contract is out of scope
pub struct StaticMetricSource {
 metrics: MonthlyMetrics,
}

impl StaticMetricSource {
 pub fn new(metrics: MonthlyMetrics) -> Self {
 Self { metrics }
 }

 /// A plausible healthy-month fixture, useful for smoke tests.
 pub fn healthy(period_days: u32) -> Self {
 let mut sample_counts = BTreeMap::new();
 sample_counts.insert("collateral".to_string(), period_days);
 sample_counts.insert("peg".to_string(), period_days);
 Self::new(MonthlyMetrics {
 avg_collateral_ratio: 1.05,
 min_collateral_ratio: 1.01,
 avg_peg_deviation: 0.001,
 peg_alert_count: 0,
 avg_liquidity_ratio: 0.92,
 avg_por_failure_rate: 0.0,
 days_covered: period_days,
 total_days: period_days,
 last_update_hours_ago: 1.0,
 sample_counts,
 })
 }
}

#[async_trait]
impl MetricSource for StaticMetricSource {
 async fn metrics_for_period(&self, _period: &str) -> KwonResult<MonthlyMetrics> {
 Ok(self.metrics.clone())
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[tokio::test]
 async fn mock_anchor_writer_is_deterministic_modulo_timestamp() {
 let writer = MockAnchorWriter::default();
 let a = writer.anchor("BATCH1", "mock").await.unwrap();
 let b = writer.anchor("BATCH1", "mock").await.unwrap();
 assert_eq!(a.tx_hash, b.tx_hash);
 assert_eq!(a.tx_hash, "mock-BATCH1");
 }

 #[tokio::test]
 async fn fixture_transfer_source_serves_pages_in_order() {
 let src = FixtureTransferSource::new(
 vec![vec![RawTransfer {
 hash: "0xAA".into(),
 block_number: 100,
 time_stamp: 1,
 from: "0xfrom".into(),
 to: "0xto".into(),
 contract_address: None,
 value: "1000000000000000000".into(),
 token_decimal: 18,
 }]],
 Some(200),
);
 let page1 = src.fetch_page(1, 1, 10).await.unwrap();
 assert_eq!(page1.len(), 1);
 let page2 = src.fetch_page(1, 2, 10).await.unwrap();
 assert!(page2.is_empty());
 assert_eq!(src.chain_head().await.unwrap(), Some(200));
 }
}
