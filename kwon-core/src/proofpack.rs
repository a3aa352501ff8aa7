//! Proof-Pack Builder (C5): assembles a self-describing zip
//! archive proving one event's (or a search result's) inclusion in an
//! anchored Merkle batch.

use std::io::Write;

use chrono::{Datelike, Timelike, Utc};
use kwon_spec::{AnchorRecord, AuditEvent, EventProof, KwonError, KwonResult, MerkleBatch};
use sha2::{Digest, Sha256};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::store::AuditStore;

/// `{path, sha256, bytes, count}` returned for every produced archive.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProofPackMeta {
 pub path: String,
 pub sha256: String,
 pub bytes: u64,
 pub count: usize,
}

/// One event's verification bundle, as embedded in `proof_pack.json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProofPackEntry {
 pub event: AuditEvent,
 pub proof: Option<EventProof>,
 pub batch: Option<MerkleBatch>,
 pub anchors: Vec<AnchorRecord>,
}

const PROOF_PACK_VERSION: &str = "1.0";

const VERIFICATION_INSTRUCTIONS: &str = "\
1. Recompute `details_hash` for the event from its canonical field subset.\n\
2. Fold `details_hash` through `proof.proof_path`: for each node, if \
`pos` is L, hash(sibling || running); if R, hash(running || sibling).\n\
3. The final value must equal `batch.merkle_root`.\n\
4. `anchors` lists every chain this batch's root was published to.\n";

const README: &str = "K-WON audit proof pack\n\nTo verify an entry:\n";

#[derive(Debug, Clone, serde::Serialize)]
struct Verification {
 instructions: &'static str,
}

/// Single-event `proof_pack.json` document.
#[derive(Debug, Clone, serde::Serialize)]
struct SingleProofPackDocument {
 version: &'static str,
 generated_at: String,
 event: ProofPackEntry,
 verification: Verification,
}

/// Multi-event (search) `proof_pack.json` document.
#[derive(Debug, Clone, serde::Serialize)]
struct SearchProofPackDocument {
 version: &'static str,
 generated_at: String,
 events: Vec<ProofPackEntry>,
 verification: Verification,
}

fn format_generated_at(generated_at: chrono::DateTime<Utc>) -> String {
 generated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

async fn build_entry(store: &AuditStore, event_id: &str) -> KwonResult<Option<ProofPackEntry>> {
 let Some(event) = store.get_event(event_id).await? else { return Ok(None) };
 match store.join_event_proof_batch_anchor(event_id).await? {
 Some((event, proof, batch, anchors)) => Ok(Some(ProofPackEntry { event, proof: Some(proof), batch: Some(batch), anchors })),
 None => Ok(Some(ProofPackEntry { event, proof: None, batch: None, anchors: vec![] })),
 }
}

fn write_archive(filename: &str, proof_pack_json: &str, event_raw_json: Option<&str>, generated_at: chrono::DateTime<Utc>) -> KwonResult<(Vec<u8>, ProofPackMeta)> {
 let mut buf = Vec::new();
 {
 let cursor = std::io::Cursor::new(&mut buf);
 let mut zip = ZipWriter::new(cursor);
 // Zip entry timestamps default to wall-clock time, which would make
 // two archives for the same logical content differ byte-for-byte;
 // pin them to the injected clock so archives are reproducible.
 let mod_time = zip::DateTime::from_date_and_time(
 generated_at.year() as u16,
 generated_at.month() as u8,
 generated_at.day() as u8,
 generated_at.hour() as u8,
 generated_at.minute() as u8,
 generated_at.second() as u8,
 )
 .unwrap_or_default();
 let options: FileOptions = FileOptions::default().compression_method(zip::CompressionMethod::Deflated).last_modified_time(mod_time);

 zip.start_file("proof_pack.json", options).map_err(|e| KwonError::Internal(e.to_string()))?;
 zip.write_all(proof_pack_json.as_bytes()).map_err(|e| KwonError::Internal(e.to_string()))?;

 if let Some(raw) = event_raw_json {
 zip.start_file("event_raw.json", options).map_err(|e| KwonError::Internal(e.to_string()))?;
 zip.write_all(raw.as_bytes()).map_err(|e| KwonError::Internal(e.to_string()))?;
 }

 zip.start_file("README.txt", options).map_err(|e| KwonError::Internal(e.to_string()))?;
 zip.write_all(README.as_bytes()).map_err(|e| KwonError::Internal(e.to_string()))?;
 zip.write_all(VERIFICATION_INSTRUCTIONS.as_bytes()).map_err(|e| KwonError::Internal(e.to_string()))?;

 zip.finish().map_err(|e| KwonError::Internal(e.to_string()))?;
 }

 let sha256 = hex::encode(Sha256::digest(&buf));
 let meta = ProofPackMeta { path: filename.to_string(), sha256, bytes: buf.len() as u64, count: 1 };
 Ok((buf, meta))
}

/// Single-event proof pack. `filename` is deterministic: the event id.
/// `generated_at` is injected rather than read from the clock so archives
/// are byte-identical for a fixed input (tests pin it).
pub async fn build_single_event_pack(store: &AuditStore, event_id: &str, include_raw: bool, generated_at: chrono::DateTime<Utc>) -> KwonResult<(Vec<u8>, ProofPackMeta)> {
 let entry = build_entry(store, event_id).await?.ok_or_else(|| KwonError::NotFound(format!("event {event_id}")))?;
 let raw_json = include_raw.then(|| entry.event.raw_json.to_string());
 let document = SingleProofPackDocument {
 version: PROOF_PACK_VERSION,
 generated_at: format_generated_at(generated_at),
 event: entry,
 verification: Verification { instructions: VERIFICATION_INSTRUCTIONS },
 };
 let proof_pack_json = serde_json::to_string_pretty(&document).map_err(|e| KwonError::Internal(e.to_string()))?;

 let safe_name = event_id.trim_start_matches("0x");
 let filename = format!("{safe_name}.zip");
 let (bytes, mut meta) = write_archive(&filename, &proof_pack_json, raw_json.as_deref(), generated_at)?;
 meta.count = 1;
 Ok((bytes, meta))
}

/// Filters applied by a multi-event proof-pack search.
#[derive(Debug, Clone, Default)]
pub struct PackSearchFilter {
 pub address: Option<String>,
 pub address_role: AddressRole,
 pub tx_hash_exact: Option<String>,
 pub tx_hash_prefix: Option<String>,
 pub min_amount: Option<f64>,
 pub max_amount: Option<f64>,
 pub min_block: Option<i64>,
 pub max_block: Option<i64>,
 pub time_from: Option<chrono::DateTime<Utc>>,
 pub time_to: Option<chrono::DateTime<Utc>>,
 pub limit: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressRole {
 #[default]
 Any,
 From,
 To,
}

fn matches_filter(event: &AuditEvent, filter: &PackSearchFilter) -> bool {
 if let Some(addr) = &filter.address {
 let addr = addr.to_lowercase();
 let hit = match filter.address_role {
 AddressRole::Any => event.from == addr || event.to == addr,
 AddressRole::From => event.from == addr,
 AddressRole::To => event.to == addr,
 };
 if !hit {
 return false;
 }
 }
 if let Some(exact) = &filter.tx_hash_exact {
 if event.event_id != *exact {
 return false;
 }
 }
 if let Some(prefix) = &filter.tx_hash_prefix {
 if !event.event_id.starts_with(prefix.as_str()) {
 return false;
 }
 }
 if let Some(min) = filter.min_amount {
 if event.amount < min {
 return false;
 }
 }
 if let Some(max) = filter.max_amount {
 if event.amount > max {
 return false;
 }
 }
 if let Some(min) = filter.min_block {
 if event.block_number < min {
 return false;
 }
 }
 if let Some(max) = filter.max_block {
 if event.block_number > max {
 return false;
 }
 }
 if let Some(from) = filter.time_from {
 if event.timestamp < from {
 return false;
 }
 }
 if let Some(to) = filter.time_to {
 if event.timestamp > to {
 return false;
 }
 }
 true
}

/// Multi-event proof pack for a search query. `filename` is deterministic:
/// `proof_pack_batch_<UTC-compact-ts>_n<count>.zip`. `generated_at` is
/// injected rather than read from the clock so the filename and the
/// embedded timestamp are byte-identical for a fixed input.
pub async fn build_search_pack(store: &AuditStore, filter: &PackSearchFilter, scan_limit: i64, generated_at: chrono::DateTime<Utc>) -> KwonResult<(Vec<u8>, ProofPackMeta)> {
 let candidates = store.select_unproven(scan_limit, crate::store::SelectOrder::Oldest, filter.min_block).await?;
 let mut proven_ids = Vec::new();
 // `select_unproven` only returns events without a proof; a real search
 // also needs proven events, so additionally scan recent batches' events.
 let recent_batches = store.recent_batches(64).await?;
 for batch in &recent_batches {
 let events = store.events_in_batch(&batch.batch_id, 10_000).await?;
 proven_ids.extend(events);
 }

 let mut matched: Vec<AuditEvent> = candidates.into_iter().chain(proven_ids).filter(|e| matches_filter(e, filter)).collect();
 matched.sort_by(|a, b| a.event_id.cmp(&b.event_id));
 matched.dedup_by(|a, b| a.event_id == b.event_id);
 matched.truncate(filter.limit.max(0) as usize);

 let mut entries = Vec::with_capacity(matched.len());
 for event in &matched {
 if let Some(entry) = build_entry(store, &event.event_id).await? {
 entries.push(entry);
 }
 }

 let count = entries.len();
 let document = SearchProofPackDocument {
 version: PROOF_PACK_VERSION,
 generated_at: format_generated_at(generated_at),
 events: entries,
 verification: Verification { instructions: VERIFICATION_INSTRUCTIONS },
 };
 let proof_pack_json = serde_json::to_string_pretty(&document).map_err(|e| KwonError::Internal(e.to_string()))?;
 let ts = generated_at.format("%Y%m%dT%H%M%SZ");
 let filename = format!("proof_pack_batch_{ts}_n{count}.zip");
 let (bytes, mut meta) = write_archive(&filename, &proof_pack_json, None, generated_at)?;
 meta.count = count;
 Ok((bytes, meta))
}

#[cfg(test)]
mod tests {
 use std::io::Read;

 use super::*;
 use crate::batch::{make_batch, BatchMode};
 use kwon_spec::AuditEvent;
 use zip::ZipArchive;

 async fn store_with_event() -> AuditStore {
 let store = AuditStore::connect("sqlite::memory:").await.unwrap();
 let event = AuditEvent {
 event_id: "0xaa".into(),
 block_number: 100,
 timestamp: Utc::now(),
 from: "0xfrom".into(),
 to: "0xto".into(),
 contract_address: None,
 amount: 1.0,
 raw_json: serde_json::json!({"hash": "0xaa"}),
 details_hash: Some("a".repeat(64)),
 };
 store.append_event(&event, None).await.unwrap();
 store
 }

 fn fixed_clock() -> chrono::DateTime<Utc> {
 "2026-01-02T03:04:05Z".parse().unwrap()
 }

 #[tokio::test]
 async fn single_event_pack_has_deterministic_name_and_sha256() {
 let store = store_with_event().await;
 let (bytes, meta) = build_single_event_pack(&store, "0xaa", true, fixed_clock()).await.unwrap();
 assert_eq!(meta.path, "aa.zip");
 assert_eq!(meta.count, 1);
 assert_eq!(meta.bytes, bytes.len() as u64);
 assert_eq!(meta.sha256, hex::encode(Sha256::digest(&bytes)));
 }

 #[tokio::test]
 async fn single_event_pack_includes_batch_and_anchor_after_batching() {
 let store = store_with_event().await;
 make_batch(&store, 10, BatchMode::Oldest, None).await.unwrap();
 let (_, meta) = build_single_event_pack(&store, "0xaa", false, fixed_clock()).await.unwrap();
 assert_eq!(meta.count, 1);
 }

 #[tokio::test]
 async fn missing_event_is_not_found() {
 let store = AuditStore::connect("sqlite::memory:").await.unwrap();
 let err = build_single_event_pack(&store, "0xdead", false, fixed_clock()).await.unwrap_err();
 assert!(matches!(err, KwonError::NotFound(_)));
 }

 #[tokio::test]
 async fn single_event_pack_is_byte_identical_for_a_fixed_clock() {
 let store = store_with_event().await;
 let (first, _) = build_single_event_pack(&store, "0xaa", true, fixed_clock()).await.unwrap();
 let (second, _) = build_single_event_pack(&store, "0xaa", true, fixed_clock()).await.unwrap();
 assert_eq!(first, second);
 }

 #[tokio::test]
 async fn search_pack_envelope_carries_version_and_generated_at() {
 let store = store_with_event().await;
 let filter = PackSearchFilter { limit: 10, ..Default::default() };
 let (bytes, meta) = build_search_pack(&store, &filter, 100, fixed_clock()).await.unwrap();
 assert_eq!(meta.count, 1);
 let mut zip = ZipArchive::new(std::io::Cursor::new(&bytes)).unwrap();
 let mut doc = String::new();
 zip.by_name("proof_pack.json").unwrap().read_to_string(&mut doc).unwrap();
 let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
 assert_eq!(value["version"], "1.0");
 assert_eq!(value["generated_at"], "2026-01-02T03:04:05Z");
 assert!(value["verification"]["instructions"].as_str().unwrap().contains("details_hash"));
 assert_eq!(value["events"].as_array().unwrap().len(), 1);
 }
}
