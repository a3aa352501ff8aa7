//! Audit Store (C2): transactional persistence of events,
//! batches, proofs, anchors, and sync cursors.
//!
//! Uses `sqlx::Pool<Sqlite>` with an inline `ensure_schema` migration
//! rather than a content-addressed append log: this data is relational
//! (joins, uniqueness constraints, ordered range scans) and fits SQL
//! better than a log-structured store.

use chrono::{DateTime, Utc};
use kwon_spec::{AnchorRecord, AnchorStatus, AuditEvent, EventProof, KwonError, KwonResult, MerkleBatch, ProofNode, ProofPosition};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

/// Ordering for `select_unproven`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOrder {
 Oldest,
 Latest,
}

/// Relational audit store backed by `sqlx` (SQLite or Postgres by `DB_URL`
/// scheme; this crate wires SQLite directly and leaves Postgres as a
/// straightforward swap of the pool constructor).
pub struct AuditStore {
 pool: SqlitePool,
}

impl AuditStore {
 pub async fn connect(database_url: &str) -> KwonResult<Self> {
 let pool = SqlitePoolOptions::new()
.max_connections(8)
.connect(database_url)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 let store = Self { pool };
 store.ensure_schema().await?;
 Ok(store)
 }

 pub fn pool(&self) -> &SqlitePool {
 &self.pool
 }

 async fn ensure_schema(&self) -> KwonResult<()> {
 sqlx::query(
 r#"
 CREATE TABLE IF NOT EXISTS audit_events (
 id INTEGER PRIMARY KEY AUTOINCREMENT,
 event_id TEXT NOT NULL UNIQUE,
 block_number INTEGER NOT NULL,
 timestamp TEXT NOT NULL,
 from_address TEXT NOT NULL,
 to_address TEXT NOT NULL,
 contract_address TEXT,
 amount REAL NOT NULL,
 raw_json TEXT NOT NULL,
 details_hash TEXT,
 tx_hash TEXT
);
 "#,
)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_events_block ON audit_events(block_number DESC, id DESC);")
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 sqlx::query(
 r#"
 CREATE TABLE IF NOT EXISTS merkle_batches (
 batch_id TEXT PRIMARY KEY,
 merkle_root TEXT NOT NULL,
 leaf_count INTEGER NOT NULL,
 created_at TEXT NOT NULL,
 anchored_tx TEXT
);
 "#,
)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 sqlx::query(
 r#"
 CREATE TABLE IF NOT EXISTS event_proofs (
 event_id TEXT PRIMARY KEY,
 batch_id TEXT NOT NULL,
 leaf_index INTEGER NOT NULL,
 proof_json TEXT NOT NULL
);
 "#,
)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_proofs_batch ON event_proofs(batch_id);")
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 sqlx::query(
 r#"
 CREATE TABLE IF NOT EXISTS anchor_records (
 batch_id TEXT NOT NULL,
 chain TEXT NOT NULL,
 tx_hash TEXT NOT NULL,
 block_number INTEGER,
 status TEXT NOT NULL,
 anchored_at TEXT,
 PRIMARY KEY (batch_id, chain)
);
 "#,
)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 sqlx::query(
 r#"
 CREATE TABLE IF NOT EXISTS sync_state (
 source TEXT PRIMARY KEY,
 last_block INTEGER NOT NULL,
 updated_at TEXT NOT NULL
);
 "#,
)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 Ok(())
 }

 /// Fails with `Duplicate` if `event_id` exists; otherwise commits.
 pub async fn append_event(&self, event: &AuditEvent, tx_hash: Option<&str>) -> KwonResult<()> {
 let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM audit_events WHERE event_id = ?")
.bind(&event.event_id)
.fetch_optional(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 if existing.is_some() {
 return Err(KwonError::Duplicate(event.event_id.clone()));
 }

 sqlx::query(
 r#"
 INSERT INTO audit_events
 (event_id, block_number, timestamp, from_address, to_address, contract_address, amount, raw_json, details_hash, tx_hash)
 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
 "#,
)
.bind(&event.event_id)
.bind(event.block_number)
.bind(event.timestamp.to_rfc3339())
.bind(&event.from)
.bind(&event.to)
.bind(&event.contract_address)
.bind(event.amount)
.bind(event.raw_json.to_string())
.bind(&event.details_hash)
.bind(tx_hash)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(())
 }

 pub async fn get_last_block(&self, source: &str) -> KwonResult<Option<i64>> {
 let row: Option<i64> = sqlx::query_scalar("SELECT last_block FROM sync_state WHERE source = ?")
.bind(source)
.fetch_optional(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(row)
 }

 /// Idempotent and monotone on `source`: never moves `last_block` backward.
 pub async fn set_last_block(&self, source: &str, n: i64) -> KwonResult<()> {
 let current = self.get_last_block(source).await?.unwrap_or(i64::MIN);
 if n < current {
 return Ok(());
 }
 sqlx::query(
 r#"
 INSERT INTO sync_state (source, last_block, updated_at) VALUES (?, ?, ?)
 ON CONFLICT(source) DO UPDATE SET last_block = excluded.last_block, updated_at = excluded.updated_at
 "#,
)
.bind(source)
.bind(n)
.bind(Utc::now().to_rfc3339())
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(())
 }

 /// Highest `block_number` present in `audit_events`, or `None` if empty.
 pub async fn max_block_number(&self) -> KwonResult<Option<i64>> {
 let row: Option<i64> = sqlx::query_scalar("SELECT MAX(block_number) FROM audit_events")
.fetch_one(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(row)
 }

 /// Count of events with no `EventProof` row, optionally floored at `min_block`.
 pub async fn count_unproven(&self, min_block: Option<i64>) -> KwonResult<i64> {
 let count: i64 = if let Some(min_block) = min_block {
 sqlx::query_scalar(
 r#"
 SELECT COUNT(*) FROM audit_events e
 LEFT JOIN event_proofs p ON p.event_id = e.event_id
 WHERE p.event_id IS NULL AND e.block_number >= ?
 "#,
)
.bind(min_block)
.fetch_one(&self.pool)
.await
 } else {
 sqlx::query_scalar(
 r#"
 SELECT COUNT(*) FROM audit_events e
 LEFT JOIN event_proofs p ON p.event_id = e.event_id
 WHERE p.event_id IS NULL
 "#,
)
.fetch_one(&self.pool)
.await
 }
.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(count)
 }

 /// Rows without a proof yet, ordered per `order`, optionally floored at `min_block`.
 pub async fn select_unproven(&self, limit: i64, order: SelectOrder, min_block: Option<i64>) -> KwonResult<Vec<AuditEvent>> {
 let order_clause = match order {
 SelectOrder::Oldest => "ORDER BY e.block_number ASC, e.id ASC",
 SelectOrder::Latest => "ORDER BY e.block_number DESC, e.id DESC",
 };
 let sql = format!(
 r#"
 SELECT e.event_id, e.block_number, e.timestamp, e.from_address, e.to_address,
 e.contract_address, e.amount, e.raw_json, e.details_hash, e.tx_hash
 FROM audit_events e
 LEFT JOIN event_proofs p ON p.event_id = e.event_id
 WHERE p.event_id IS NULL {}
 {}
 LIMIT ?
 "#,
 min_block.map(|_| "AND e.block_number >= ?").unwrap_or(""),
 order_clause
);
 let mut query = sqlx::query(&sql);
 if let Some(min_block) = min_block {
 query = query.bind(min_block);
 }
 query = query.bind(limit);
 let rows = query.fetch_all(&self.pool).await.map_err(|e| KwonError::Storage(e.to_string()))?;
 rows.iter().map(row_to_event).collect()
 }

 /// Single transaction: inserts `batch` and exactly one proof per event.
 pub async fn insert_batch(&self, batch: &MerkleBatch, proofs: &[EventProof]) -> KwonResult<()> {
 let mut tx = self.pool.begin().await.map_err(|e| KwonError::Storage(e.to_string()))?;

 sqlx::query(
 "INSERT INTO merkle_batches (batch_id, merkle_root, leaf_count, created_at, anchored_tx) VALUES (?, ?, ?, ?, ?)",
)
.bind(&batch.batch_id)
.bind(&batch.merkle_root)
.bind(batch.leaf_count)
.bind(batch.created_at.to_rfc3339())
.bind(&batch.anchored_tx)
.execute(&mut *tx)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 for proof in proofs {
 let proof_json = serde_json::to_string(&proof.proof_path).map_err(|e| KwonError::Internal(e.to_string()))?;
 sqlx::query("INSERT INTO event_proofs (event_id, batch_id, leaf_index, proof_json) VALUES (?, ?, ?, ?)")
.bind(&proof.event_id)
.bind(&proof.batch_id)
.bind(proof.leaf_index)
.bind(proof_json)
.execute(&mut *tx)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 }

 tx.commit().await.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(())
 }

 /// Unique on `(batch_id, chain)`; `anchored_at` is set on first success
 /// and never overwritten.
 pub async fn upsert_anchor(&self, batch_id: &str, chain: &str, tx_hash: &str, status: AnchorStatus) -> KwonResult<AnchorRecord> {
 let existing = self.anchor_status(batch_id, chain).await?;
 let anchored_at = match &existing {
 Some(rec) if rec.anchored_at.is_some() => rec.anchored_at,
 _ if status == AnchorStatus::Anchored => Some(Utc::now()),
 _ => None,
 };
 let status_str = anchor_status_str(status);
 sqlx::query(
 r#"
 INSERT INTO anchor_records (batch_id, chain, tx_hash, block_number, status, anchored_at)
 VALUES (?, ?, ?, NULL, ?, ?)
 ON CONFLICT(batch_id, chain) DO UPDATE SET
 status = excluded.status,
 tx_hash = CASE WHEN anchor_records.tx_hash IS NOT NULL AND anchor_records.tx_hash != '' THEN anchor_records.tx_hash ELSE excluded.tx_hash END,
 anchored_at = COALESCE(anchor_records.anchored_at, excluded.anchored_at)
 "#,
)
.bind(batch_id)
.bind(chain)
.bind(tx_hash)
.bind(status_str)
.bind(anchored_at.map(|t| t.to_rfc3339()))
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 // Mirror the anchor tx onto the batch row if it has none yet.
 sqlx::query("UPDATE merkle_batches SET anchored_tx = COALESCE(anchored_tx, ?) WHERE batch_id = ?")
.bind(tx_hash)
.bind(batch_id)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 self.anchor_status(batch_id, chain)
.await?
.ok_or_else(|| KwonError::Internal("anchor upsert did not persist".into()))
 }

 pub async fn anchor_status(&self, batch_id: &str, chain: &str) -> KwonResult<Option<AnchorRecord>> {
 let row = sqlx::query(
 "SELECT batch_id, chain, tx_hash, block_number, status, anchored_at FROM anchor_records WHERE batch_id = ? AND chain = ?",
)
.bind(batch_id)
.bind(chain)
.fetch_optional(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 row.map(row_to_anchor).transpose()
 }

 pub async fn get_batch(&self, batch_id: &str) -> KwonResult<Option<MerkleBatch>> {
 let row = sqlx::query("SELECT batch_id, merkle_root, leaf_count, created_at, anchored_tx FROM merkle_batches WHERE batch_id = ?")
.bind(batch_id)
.fetch_optional(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 row.map(row_to_batch).transpose()
 }

 pub async fn recent_batches(&self, limit: i64) -> KwonResult<Vec<MerkleBatch>> {
 let rows = sqlx::query("SELECT batch_id, merkle_root, leaf_count, created_at, anchored_tx FROM merkle_batches ORDER BY batch_id DESC LIMIT ?")
.bind(limit)
.fetch_all(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 rows.iter().map(row_to_batch).collect()
 }

 /// Most recent events by `(block_number desc, id desc)`, for the
 /// `events_recent`/`events_search` tool-server endpoints.
 pub async fn recent_events(&self, limit: i64) -> KwonResult<Vec<AuditEvent>> {
 let rows = sqlx::query(
 r#"
 SELECT event_id, block_number, timestamp, from_address, to_address,
 contract_address, amount, raw_json, details_hash, tx_hash
 FROM audit_events ORDER BY block_number DESC, id DESC LIMIT ?
 "#,
)
.bind(limit)
.fetch_all(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 rows.iter().map(row_to_event).collect()
 }

 pub async fn get_event(&self, event_id: &str) -> KwonResult<Option<AuditEvent>> {
 let row = sqlx::query(
 r#"
 SELECT event_id, block_number, timestamp, from_address, to_address,
 contract_address, amount, raw_json, details_hash, tx_hash
 FROM audit_events WHERE event_id = ?
 "#,
)
.bind(event_id)
.fetch_optional(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 row.map(|r| row_to_event(&r)).transpose()
 }

 pub async fn get_proof(&self, event_id: &str) -> KwonResult<Option<EventProof>> {
 let row = sqlx::query("SELECT event_id, batch_id, leaf_index, proof_json FROM event_proofs WHERE event_id = ?")
.bind(event_id)
.fetch_optional(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 row.map(row_to_proof).transpose()
 }

 pub async fn events_in_batch(&self, batch_id: &str, limit: i64) -> KwonResult<Vec<AuditEvent>> {
 let rows = sqlx::query(
 r#"
 SELECT e.event_id, e.block_number, e.timestamp, e.from_address, e.to_address,
 e.contract_address, e.amount, e.raw_json, e.details_hash, e.tx_hash
 FROM audit_events e
 JOIN event_proofs p ON p.event_id = e.event_id
 WHERE p.batch_id = ?
 ORDER BY p.leaf_index ASC
 LIMIT ?
 "#,
)
.bind(batch_id)
.bind(limit)
.fetch_all(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 rows.iter().map(row_to_event).collect()
 }

 /// Returns the complete verification bundle for one event: the event
 /// itself, its proof, the batch it belongs to, and every anchor of
 /// that batch across chains.
 pub async fn join_event_proof_batch_anchor(&self, event_id: &str) -> KwonResult<Option<(AuditEvent, EventProof, MerkleBatch, Vec<AnchorRecord>)>> {
 let Some(event) = self.get_event(event_id).await? else { return Ok(None) };
 let Some(proof) = self.get_proof(event_id).await? else { return Ok(None) };
 let Some(batch) = self.get_batch(&proof.batch_id).await? else { return Ok(None) };
 let rows = sqlx::query("SELECT batch_id, chain, tx_hash, block_number, status, anchored_at FROM anchor_records WHERE batch_id = ?")
.bind(&proof.batch_id)
.fetch_all(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 let anchors: KwonResult<Vec<AnchorRecord>> = rows.iter().map(row_to_anchor).collect();
 Ok(Some((event, proof, batch, anchors?)))
 }

 /// Backfill `details_hash` for legacy rows inserted before hashing was
 /// enabled, falling back to `tx_hash` when the caller can't recompute it.
 pub async fn backfill_missing_hashes<F>(&self, limit: i64, compute: F) -> KwonResult<u64>
 where
 F: Fn(&AuditEvent) -> Option<String>,
 {
 let rows = sqlx::query(
 r#"
 SELECT event_id, block_number, timestamp, from_address, to_address,
 contract_address, amount, raw_json, details_hash, tx_hash
 FROM audit_events WHERE details_hash IS NULL LIMIT ?
 "#,
)
.bind(limit)
.fetch_all(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 let mut updated = 0u64;
 for row in &rows {
 let event = row_to_event(row)?;
 if let Some(hash) = compute(&event) {
 sqlx::query("UPDATE audit_events SET details_hash = ? WHERE event_id = ?")
.bind(&hash)
.bind(&event.event_id)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 updated += 1;
 }
 }
 Ok(updated)
 }
}

fn anchor_status_str(status: AnchorStatus) -> &'static str {
 match status {
 AnchorStatus::Anchored => "anchored",
 AnchorStatus::NotAnchored => "not_anchored",
 AnchorStatus::Pending => "pending",
 }
}

fn anchor_status_from_str(s: &str) -> AnchorStatus {
 match s {
 "anchored" => AnchorStatus::Anchored,
 "pending" => AnchorStatus::Pending,
 _ => AnchorStatus::NotAnchored,
 }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> KwonResult<AuditEvent> {
 let raw_json: String = row.try_get("raw_json").map_err(|e| KwonError::Storage(e.to_string()))?;
 let timestamp: String = row.try_get("timestamp").map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(AuditEvent {
 event_id: row.try_get("event_id").map_err(|e| KwonError::Storage(e.to_string()))?,
 block_number: row.try_get("block_number").map_err(|e| KwonError::Storage(e.to_string()))?,
 timestamp: DateTime::parse_from_rfc3339(&timestamp).map_err(|e| KwonError::Internal(e.to_string()))?.with_timezone(&Utc),
 from: row.try_get("from_address").map_err(|e| KwonError::Storage(e.to_string()))?,
 to: row.try_get("to_address").map_err(|e| KwonError::Storage(e.to_string()))?,
 contract_address: row.try_get("contract_address").map_err(|e| KwonError::Storage(e.to_string()))?,
 amount: row.try_get("amount").map_err(|e| KwonError::Storage(e.to_string()))?,
 raw_json: serde_json::from_str(&raw_json).unwrap_or(serde_json::Value::Null),
 details_hash: row.try_get("details_hash").map_err(|e| KwonError::Storage(e.to_string()))?,
 })
}

fn row_to_batch(row: &sqlx::sqlite::SqliteRow) -> KwonResult<MerkleBatch> {
 let created_at: String = row.try_get("created_at").map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(MerkleBatch {
 batch_id: row.try_get("batch_id").map_err(|e| KwonError::Storage(e.to_string()))?,
 merkle_root: row.try_get("merkle_root").map_err(|e| KwonError::Storage(e.to_string()))?,
 leaf_count: row.try_get("leaf_count").map_err(|e| KwonError::Storage(e.to_string()))?,
 created_at: DateTime::parse_from_rfc3339(&created_at).map_err(|e| KwonError::Internal(e.to_string()))?.with_timezone(&Utc),
 anchored_tx: row.try_get("anchored_tx").map_err(|e| KwonError::Storage(e.to_string()))?,
 })
}

fn row_to_proof(row: &sqlx::sqlite::SqliteRow) -> KwonResult<EventProof> {
 let proof_json: String = row.try_get("proof_json").map_err(|e| KwonError::Storage(e.to_string()))?;
 let proof_path: Vec<ProofNode> = serde_json::from_str(&proof_json).map_err(|e| KwonError::Internal(e.to_string()))?;
 Ok(EventProof {
 event_id: row.try_get("event_id").map_err(|e| KwonError::Storage(e.to_string()))?,
 batch_id: row.try_get("batch_id").map_err(|e| KwonError::Storage(e.to_string()))?,
 leaf_index: row.try_get("leaf_index").map_err(|e| KwonError::Storage(e.to_string()))?,
 proof_path,
 })
}

fn row_to_anchor(row: &sqlx::sqlite::SqliteRow) -> KwonResult<AnchorRecord> {
 let anchored_at: Option<String> = row.try_get("anchored_at").map_err(|e| KwonError::Storage(e.to_string()))?;
 let status: String = row.try_get("status").map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(AnchorRecord {
 batch_id: row.try_get("batch_id").map_err(|e| KwonError::Storage(e.to_string()))?,
 chain: row.try_get("chain").map_err(|e| KwonError::Storage(e.to_string()))?,
 tx_hash: row.try_get("tx_hash").map_err(|e| KwonError::Storage(e.to_string()))?,
 block_number: row.try_get("block_number").map_err(|e| KwonError::Storage(e.to_string()))?,
 status: anchor_status_from_str(&status),
 anchored_at: anchored_at
.map(|t| DateTime::parse_from_rfc3339(&t).map(|d| d.with_timezone(&Utc)))
.transpose()
.map_err(|e| KwonError::Internal(e.to_string()))?,
 })
}

#[cfg(test)]
mod tests {
 use super::*;
 use kwon_spec::ProofPosition;

 async fn test_store() -> AuditStore {
 AuditStore::connect("sqlite::memory:").await.unwrap()
 }

 fn sample_event(id: &str, block: i64) -> AuditEvent {
 AuditEvent {
 event_id: id.to_string(),
 block_number: block,
 timestamp: Utc::now(),
 from: "0xfrom".into(),
 to: "0xto".into(),
 contract_address: Some("0xcontract".into()),
 amount: 1.0,
 raw_json: serde_json::json!({"hash": id}),
 details_hash: Some(format!("{:064x}", block)),
 }
 }

 #[tokio::test]
 async fn append_event_rejects_duplicates() {
 let store = test_store().await;
 let event = sample_event("0xAA", 100);
 store.append_event(&event, Some("0xAA")).await.unwrap();
 let err = store.append_event(&event, Some("0xAA")).await.unwrap_err();
 assert!(matches!(err, KwonError::Duplicate(_)));
 }

 #[tokio::test]
 async fn set_last_block_is_monotone() {
 let store = test_store().await;
 store.set_last_block("src", 100).await.unwrap();
 store.set_last_block("src", 50).await.unwrap();
 assert_eq!(store.get_last_block("src").await.unwrap(), Some(100));
 store.set_last_block("src", 150).await.unwrap();
 assert_eq!(store.get_last_block("src").await.unwrap(), Some(150));
 }

 #[tokio::test]
 async fn select_unproven_orders_oldest_and_latest() {
 let store = test_store().await;
 store.append_event(&sample_event("0xA", 100), None).await.unwrap();
 store.append_event(&sample_event("0xB", 50), None).await.unwrap();
 let oldest = store.select_unproven(10, SelectOrder::Oldest, None).await.unwrap();
 assert_eq!(oldest[0].event_id, "0xB");
 let latest = store.select_unproven(10, SelectOrder::Latest, None).await.unwrap();
 assert_eq!(latest[0].event_id, "0xA");
 }

 #[tokio::test]
 async fn insert_batch_and_join_round_trips() {
 let store = test_store().await;
 let event = sample_event("0xAA", 100);
 store.append_event(&event, None).await.unwrap();
 let batch = MerkleBatch {
 batch_id: "B1".into(),
 merkle_root: "root".into(),
 leaf_count: 1,
 created_at: Utc::now(),
 anchored_tx: None,
 };
 let proof = EventProof { event_id: "0xAA".into(), batch_id: "B1".into(), leaf_index: 0, proof_path: vec![] };
 store.insert_batch(&batch, &[proof]).await.unwrap();

 let (got_event, got_proof, got_batch, anchors) = store.join_event_proof_batch_anchor("0xAA").await.unwrap().unwrap();
 assert_eq!(got_event.event_id, "0xAA");
 assert_eq!(got_proof.batch_id, "B1");
 assert_eq!(got_batch.merkle_root, "root");
 assert!(anchors.is_empty());
 }

 #[tokio::test]
 async fn anchor_upsert_sets_anchored_at_once() {
 let store = test_store().await;
 let batch = MerkleBatch { batch_id: "B1".into(), merkle_root: "root".into(), leaf_count: 1, created_at: Utc::now(), anchored_tx: None };
 store.insert_batch(&batch, &[]).await.unwrap();

 let first = store.upsert_anchor("B1", "mock", "mock-B1", AnchorStatus::Anchored).await.unwrap();
 assert!(first.anchored_at.is_some());
 let second = store.upsert_anchor("B1", "mock", "mock-B1", AnchorStatus::Anchored).await.unwrap();
 assert_eq!(first.anchored_at, second.anchored_at);
 assert_eq!(first.tx_hash, second.tx_hash);
 }

 #[tokio::test]
 async fn proof_path_round_trips_through_json_column() {
 let store = test_store().await;
 store.append_event(&sample_event("0xAA", 100), None).await.unwrap();
 let batch = MerkleBatch { batch_id: "B1".into(), merkle_root: "root".into(), leaf_count: 1, created_at: Utc::now(), anchored_tx: None };
 let path = vec![ProofNode { pos: ProofPosition::R, hash: "deadbeef".into() }];
 let proof = EventProof { event_id: "0xAA".into(), batch_id: "B1".into(), leaf_index: 0, proof_path: path.clone() };
 store.insert_batch(&batch, &[proof]).await.unwrap();
 let got = store.get_proof("0xAA").await.unwrap().unwrap();
 assert_eq!(got.proof_path, path);
 }
}
