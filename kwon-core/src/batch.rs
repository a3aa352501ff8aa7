//! Batcher & Anchorer (C4): groups unproven events into
//! Merkle batches and publishes their roots via an `AnchorWriter`.
//!
//! Shaped like a `run_batch_loop`/`check_timeout`/`flush` batch-anchor
//! cycle, generalized to a pending-threshold and `batch_mode` trigger
//! instead of a fixed age/size-only one.

use chrono::Utc;
use kwon_adapters::AnchorWriter;
use kwon_spec::{AnchorRecord, AnchorStatus, EventProof, KwonError, KwonResult, MerkleBatch};
use tracing::info;

use crate::hashing::MerkleTree;
use crate::store::{AuditStore, SelectOrder};

/// Default chain label used by the anchorer when the caller does not name one.
pub const DEFAULT_CHAIN: &str = "default";

/// Tunables for the periodic batching worker.
#[derive(Debug, Clone)]
pub struct BatchConfig {
 pub min_pending_events: i64,
 pub batch_limit: i64,
 pub batch_mode: BatchMode,
 pub min_block: Option<i64>,
 pub chain: String,
 pub anchor_prefix: String,
}

impl Default for BatchConfig {
 fn default() -> Self {
 Self {
 min_pending_events: 1,
 batch_limit: 500,
 batch_mode: BatchMode::Oldest,
 min_block: None,
 chain: DEFAULT_CHAIN.to_string(),
 anchor_prefix: "mock-".to_string(),
 }
 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
 Oldest,
 Latest,
}

impl From<BatchMode> for SelectOrder {
 fn from(mode: BatchMode) -> Self {
 match mode {
 BatchMode::Oldest => SelectOrder::Oldest,
 BatchMode::Latest => SelectOrder::Latest,
 }
 }
}

/// Outcome of one batching cycle: `None` when the pending threshold wasn't met.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
 pub batch: MerkleBatch,
 pub anchor: AnchorRecord,
 pub leaf_count: usize,
 pub discarded: usize,
}

fn generate_batch_id() -> String {
 Utc::now().format("%Y%m%dT%H%M%S%6fZ").to_string()
}

/// Builds a batch from up to `limit` unproven events (ordered per `mode`,
/// optionally floored at `min_block`), discarding rows with an invalid
/// `details_hash` (falling back to nothing — has no tx_hash column
/// on `AuditEvent` to fall back to, so an absent/invalid hash means discard).
/// Returns `Ok(None)` if no valid leaves remain.
pub async fn make_batch(store: &AuditStore, limit: i64, mode: BatchMode, min_block: Option<i64>) -> KwonResult<Option<(MerkleBatch, usize, usize)>> {
 let candidates = store.select_unproven(limit, mode.into(), min_block).await?;
 if candidates.is_empty() {
 return Ok(None);
 }

 let mut leaves_hex = Vec::with_capacity(candidates.len());
 let mut kept = Vec::with_capacity(candidates.len());
 let mut discarded = 0usize;
 for event in candidates {
 match event.details_hash.as_deref().map(crate::hashing::normalize_hex) {
 Some(hash) if hash.len() == 64 => {
 leaves_hex.push(hash);
 kept.push(event);
 }
 _ => discarded += 1,
 }
 }

 if leaves_hex.is_empty() {
 return Ok(None);
 }

 let tree = MerkleTree::from_hex_leaves(&leaves_hex).ok_or_else(|| KwonError::Internal("invalid leaf hash encountered after validation".into()))?;
 let batch_id = generate_batch_id();
 let batch = MerkleBatch {
 batch_id: batch_id.clone(),
 merkle_root: tree.root(),
 leaf_count: kept.len() as i64,
 created_at: Utc::now(),
 anchored_tx: None,
 };

 let proofs: Vec<EventProof> = kept
.iter()
.enumerate()
.map(|(i, event)| EventProof {
 event_id: event.event_id.clone(),
 batch_id: batch_id.clone(),
 leaf_index: i as i64,
 proof_path: tree.proof(i).expect("index within leaf_count"),
 })
.collect();

 store.insert_batch(&batch, &proofs).await?;
 Ok(Some((batch, kept.len(), discarded)))
}

/// Publishes `batch_id`'s root via `writer`, idempotent on `(batch_id, chain)`.
/// Also back-fills `MerkleBatch.anchored_tx` when absent.
pub async fn anchor_batch(store: &AuditStore, writer: &dyn AnchorWriter, batch_id: &str, chain: &str) -> KwonResult<AnchorRecord> {
 if let Some(existing) = store.anchor_status(batch_id, chain).await? {
 if existing.status == AnchorStatus::Anchored {
 return Ok(existing);
 }
 }
 let outcome = writer.anchor(batch_id, chain).await?;
 store.upsert_anchor(batch_id, chain, &outcome.tx_hash, AnchorStatus::Anchored).await
}

pub async fn anchor_status(store: &AuditStore, batch_id: &str, chain: &str) -> KwonResult<AnchorRecord> {
 store
.anchor_status(batch_id, chain)
.await?
.ok_or_else(|| KwonError::NotFound(format!("no anchor for batch {batch_id} on chain {chain}")))
}

/// One full batch+anchor cycle, run periodically.
/// Returns `Ok(None)` when `pending < min_pending_events`.
pub async fn run_batch_cycle(store: &AuditStore, writer: &dyn AnchorWriter, config: &BatchConfig) -> KwonResult<Option<BatchOutcome>> {
 let pending = store.count_unproven(config.min_block).await?;
 if pending < config.min_pending_events {
 return Ok(None);
 }

 let Some((batch, leaf_count, discarded)) = make_batch(store, config.batch_limit, config.batch_mode, config.min_block).await? else {
 return Ok(None);
 };

 let outcome = writer.anchor(&batch.batch_id, &config.chain).await?;
 let anchor = store.upsert_anchor(&batch.batch_id, &config.chain, &outcome.tx_hash, AnchorStatus::Anchored).await?;

 info!(batch_id = %batch.batch_id, leaf_count, discarded, chain = %config.chain, "batch anchored");
 Ok(Some(BatchOutcome { batch, anchor, leaf_count, discarded }))
}

#[cfg(test)]
mod tests {
 use super::*;
 use kwon_adapters::MockAnchorWriter;
 use kwon_spec::AuditEvent;

 async fn store_with_events(n: i64) -> AuditStore {
 let store = AuditStore::connect("sqlite::memory:").await.unwrap();
 for i in 0..n {
 let event = AuditEvent {
 event_id: format!("0x{:064x}", i),
 block_number: 100 + i,
 timestamp: Utc::now(),
 from: "0xfrom".into(),
 to: "0xto".into(),
 contract_address: None,
 amount: 1.0,
 raw_json: serde_json::json!({}),
 details_hash: Some(format!("{:064x}", i + 1)),
 };
 store.append_event(&event, None).await.unwrap();
 }
 store
 }

 #[tokio::test]
 async fn below_threshold_does_nothing() {
 let store = store_with_events(2).await;
 let writer = MockAnchorWriter::default();
 let config = BatchConfig { min_pending_events: 5, ..BatchConfig::default() };
 let outcome = run_batch_cycle(&store, &writer, &config).await.unwrap();
 assert!(outcome.is_none());
 }

 #[tokio::test]
 async fn batches_and_anchors_and_is_idempotent() {
 let store = store_with_events(3).await;
 let writer = MockAnchorWriter::default();
 let config = BatchConfig::default();
 let outcome = run_batch_cycle(&store, &writer, &config).await.unwrap().unwrap();
 assert_eq!(outcome.leaf_count, 3);
 assert_eq!(outcome.anchor.tx_hash, format!("mock-{}", outcome.batch.batch_id));

 let again = anchor_batch(&store, &writer, &outcome.batch.batch_id, DEFAULT_CHAIN).await.unwrap();
 assert_eq!(again.tx_hash, outcome.anchor.tx_hash);
 assert_eq!(again.anchored_at, outcome.anchor.anchored_at);
 }

 #[tokio::test]
 async fn no_event_appears_in_two_batches() {
 let store = store_with_events(2).await;
 let (first, count1, _) = make_batch(&store, 500, BatchMode::Oldest, None).await.unwrap().unwrap();
 assert_eq!(count1, 2);
 let second = make_batch(&store, 500, BatchMode::Oldest, None).await.unwrap();
 assert!(second.is_none());
 assert_ne!(first.batch_id, "");
 }
}
