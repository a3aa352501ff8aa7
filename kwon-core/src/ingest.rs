//! Event Ingestor (C3): polls a `TransferSource` for rows
//! strictly newer than the stored cursor and appends them via the store.

use std::time::{Duration, Instant};

use kwon_adapters::{RawTransfer, TransferSource};
use kwon_spec::{AuditEvent, KwonError, KwonResult};
use tracing::{debug, warn};

use crate::hashing::{details_hash, normalize_hex, LeafFields};
use crate::store::AuditStore;

/// Reorg-safety margin (blocks) applied to the chain head on an empty first
/// page in remote mode.
pub const SAFE_LAG: i64 = 12;

/// Tunables for one ingest cycle.
#[derive(Debug, Clone)]
pub struct IngestConfig {
 pub source_name: String,
 pub page_size: u32,
 pub max_pages: u32,
 pub max_seconds: u64,
 pub rate_sleep: Duration,
}

impl Default for IngestConfig {
 fn default() -> Self {
 Self {
 source_name: "default".to_string(),
 page_size: 1000,
 max_pages: 50,
 max_seconds: 30,
 rate_sleep: Duration::from_millis(0),
 }
 }
}

/// Outcome of one ingest cycle, surfaced to callers/tests/RPC.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestReport {
 pub inserted: u64,
 pub skipped: u64,
 pub pages_fetched: u32,
 pub last_block: i64,
}

fn raw_to_event(row: &RawTransfer) -> Option<AuditEvent> {
 let hash = normalize_hex(&row.hash);
 if hash.is_empty() {
 return None;
 }
 let details = details_hash(LeafFields {
 hash: &row.hash,
 block_number: &row.block_number.to_string(),
 time_stamp: &row.time_stamp.to_string(),
 from: &row.from,
 to: &row.to,
 contract_address: row.contract_address.as_deref().unwrap_or(""),
 value: &row.value,
 token_decimal: &row.token_decimal.to_string(),
 });
 Some(AuditEvent {
 event_id: format!("0x{hash}"),
 block_number: row.block_number,
 timestamp: chrono::DateTime::from_timestamp(row.time_stamp, 0).unwrap_or_else(chrono::Utc::now()),
 from: row.from.to_lowercase(),
 to: row.to.to_lowercase(),
 contract_address: row.contract_address.as_ref().map(|c| c.to_lowercase()),
 amount: row.value.parse::<f64>().unwrap_or(0.0) / 10f64.powi(row.token_decimal as i32),
 raw_json: serde_json::to_value(row).unwrap_or(serde_json::Value::Null),
 details_hash: Some(details),
 })
}

/// Runs one ingest cycle against `source`, advancing and persisting the
/// cursor for `config.source_name`. Never rewinds the cursor on failure.
pub async fn ingest_cycle(store: &AuditStore, source: &dyn TransferSource, config: &IngestConfig) -> KwonResult<IngestReport> {
 let started = Instant::now();
 let mut report = IngestReport::default();

 let last = match store.get_last_block(&config.source_name).await? {
 Some(n) => n,
 None => store.max_block_number().await?.unwrap_or(0),
 };
 report.last_block = last;

 let mut max_block_seen = last;
 let mut page: u32 = 1;

 loop {
 if page > config.max_pages {
 debug!(source = %config.source_name, page, "max_pages reached, ending cycle");
 break;
 }
 if started.elapsed() > Duration::from_secs(config.max_seconds) {
 debug!(source = %config.source_name, "max_seconds reached, ending cycle");
 break;
 }

 let start_block = last + 1;
 let rows = match source.fetch_page(start_block, page, config.page_size).await {
 Ok(rows) => rows,
 Err(e) => {
 warn!(source = %config.source_name, error = %e, "transfer source fetch failed, ending cycle gracefully");
 break;
 }
 };

 if rows.is_empty() {
 if page == 1 {
 if let Ok(Some(head)) = source.chain_head().await {
 let safe_cursor = (head - SAFE_LAG).max(last);
 if safe_cursor > last {
 store.set_last_block(&config.source_name, safe_cursor).await?;
 report.last_block = safe_cursor;
 }
 }
 }
 break;
 }

 report.pages_fetched += 1;

 for row in &rows {
 if row.block_number > max_block_seen {
 max_block_seen = row.block_number;
 }
 let Some(event) = raw_to_event(row) else {
 report.skipped += 1;
 continue;
 };
 match store.append_event(&event, Some(&row.hash)).await {
 Ok(_) => report.inserted += 1,
 Err(KwonError::Duplicate(_)) => report.skipped += 1,
 Err(e) => {
 warn!(event_id = %event.event_id, error = %e, "row-level insert failure, counted as skipped");
 report.skipped += 1;
 }
 }
 }

 if max_block_seen > last {
 let advance = (max_block_seen - 1).max(last);
 store.set_last_block(&config.source_name, advance).await?;
 report.last_block = advance;
 }

 if (rows.len() as u32) < config.page_size {
 break;
 }

 page += 1;
 if !config.rate_sleep.is_zero() {
 tokio::time::sleep(config.rate_sleep).await;
 }
 }

 if max_block_seen > last {
 let advance = (max_block_seen - 1).max(last);
 store.set_last_block(&config.source_name, advance).await?;
 report.last_block = advance;
 }

 Ok(report)
}

#[cfg(test)]
mod tests {
 use super::*;
 use kwon_adapters::FixtureTransferSource;

 fn transfer(hash: &str, block: i64) -> RawTransfer {
 RawTransfer {
 hash: hash.to_string(),
 block_number: block,
 time_stamp: 1_700_000_000,
 from: "0xFROM".into(),
 to: "0xTO".into(),
 contract_address: Some("0xCONTRACT".into()),
 value: "1000000000000000000".into(),
 token_decimal: 18,
 }
 }

 async fn store() -> AuditStore {
 AuditStore::connect("sqlite::memory:").await.unwrap()
 }

 #[tokio::test]
 async fn ingests_all_rows_and_advances_cursor() {
 let store = store().await;
 let source = FixtureTransferSource::new(vec![vec![transfer("0xAA", 100), transfer("0xBB", 101)]], Some(200));
 let config = IngestConfig { page_size: 1000, ..IngestConfig::default() };
 let report = ingest_cycle(&store, &source, &config).await.unwrap();
 assert_eq!(report.inserted, 2);
 assert_eq!(report.skipped, 0);
 assert_eq!(report.last_block, 100);
 }

 #[tokio::test]
 async fn re_running_same_cycle_is_idempotent() {
 let store = store().await;
 let source = FixtureTransferSource::new(vec![vec![transfer("0xAA", 100)], vec![]], Some(200));
 let config = IngestConfig::default();
 let first = ingest_cycle(&store, &source, &config).await.unwrap();
 assert_eq!(first.inserted, 1);

 let source2 = FixtureTransferSource::new(vec![vec![transfer("0xAA", 100)], vec![]], Some(200));
 let second = ingest_cycle(&store, &source2, &config).await.unwrap();
 assert_eq!(second.inserted, 0);
 assert_eq!(second.skipped, 1);
 }

 #[tokio::test]
 async fn empty_first_page_sets_safe_lag_cursor() {
 let store = store().await;
 let source = FixtureTransferSource::new(vec![vec![]], Some(200));
 let config = IngestConfig::default();
 let report = ingest_cycle(&store, &source, &config).await.unwrap();
 assert_eq!(report.last_block, 188);
 assert_eq!(store.get_last_block(&config.source_name).await.unwrap(), Some(188));
 }

 #[tokio::test]
 async fn max_pages_bound_stops_the_loop() {
 let store = store().await;
 let pages = vec![vec![transfer("0xAA", 100)]; 10];
 let source = FixtureTransferSource::new(pages, Some(200));
 let config = IngestConfig { max_pages: 2, page_size: 1, ..IngestConfig::default() };
 let report = ingest_cycle(&store, &source, &config).await.unwrap();
 assert!(report.pages_fetched <= 2);
 }
}
