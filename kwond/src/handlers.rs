//! Typed tool handlers: each tool declares a params struct deserialized
//! at the boundary, replacing a dynamic-kwargs dispatch with validation
//! the type checker can enforce.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kwon_core::{anchor_batch, anchor_status, build_search_pack, build_single_event_pack, make_batch, run_batch_cycle, AddressRole, BatchMode, PackSearchFilter};
use kwon_orchestrator::engine::Orchestrator;
use kwon_orchestrator::OrchestratorConfig;
use kwon_policy::{
 bank_risk_score, compute_rebalance_plan, compute_target_allocation, evaluate, run_stress_test, suggest_rebalancing, PolicyReport, RiskInputs,
 StressScenario,
};
use kwon_spec::{BankExposure, HumanDecision, KwonError, KwonResult};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

fn to_params<T: for<'de> Deserialize<'de>>(params: Value) -> KwonResult<T> {
 serde_json::from_value(params).map_err(|e| KwonError::Validation(format!("invalid params: {e}")))
}

// ---------------------------------------------------------------------
// Audit tools (C1-C5)
// ---------------------------------------------------------------------

pub async fn sync_state(state: &AppState, _params: Value) -> KwonResult<Value> {
 let last_block = state.store.get_last_block(&state.batch_config.chain).await?;
 let max_block = state.store.max_block_number().await?;
 let unproven = state.store.count_unproven(None).await?;
 Ok(json!({"last_block": last_block, "max_block_seen": max_block, "unproven_events": unproven}))
}

#[derive(Deserialize, Default)]
struct EventsRecentParams {
 #[serde(default = "default_limit")]
 limit: i64,
}

fn default_limit() -> i64 {
 50
}

pub async fn events_recent(state: &AppState, params: Value) -> KwonResult<Value> {
 let p: EventsRecentParams = to_params(params)?;
 let events = state.store.recent_events(p.limit.clamp(1, 1000)).await?;
 Ok(json!({"events": events}))
}

#[derive(Deserialize)]
struct EventDetailParams {
 tx_hash: String,
}

pub async fn event_detail(state: &AppState, params: Value) -> KwonResult<Value> {
 let p: EventDetailParams = to_params(params)?;
 let event = state.store.get_event(&p.tx_hash).await?.ok_or_else(|| KwonError::NotFound(format!("event {}", p.tx_hash)))?;
 let proof = state.store.get_proof(&p.tx_hash).await?;
 Ok(json!({"event": event, "proof": proof}))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EventsSearchParams {
 address: Option<String>,
 role: Option<String>,
 tx_hash: Option<String>,
 tx_prefix_ok: bool,
 min_amount: Option<f64>,
 max_amount: Option<f64>,
 block_min: Option<i64>,
 block_max: Option<i64>,
 start_iso: Option<String>,
 end_iso: Option<String>,
 limit: i64,
}

impl Default for EventsSearchParams {
 fn default() -> Self {
 Self {
 address: None,
 role: None,
 tx_hash: None,
 tx_prefix_ok: false,
 min_amount: None,
 max_amount: None,
 block_min: None,
 block_max: None,
 start_iso: None,
 end_iso: None,
 limit: 50,
 }
 }
}

fn parse_iso(value: &Option<String>) -> KwonResult<Option<DateTime<Utc>>> {
 value
.as_ref()
.map(|s| DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)).map_err(|e| KwonError::Validation(format!("bad ISO timestamp: {e}"))))
.transpose()
}

pub async fn events_search(state: &AppState, params: Value) -> KwonResult<Value> {
 let p: EventsSearchParams = to_params(params)?;
 let role = match p.role.as_deref() {
 Some("from") => AddressRole::From,
 Some("to") => AddressRole::To,
 _ => AddressRole::Any,
 };
 let filter = PackSearchFilter {
 address: p.address,
 address_role: role,
 tx_hash_exact: if p.tx_prefix_ok { None } else { p.tx_hash.clone() },
 tx_hash_prefix: if p.tx_prefix_ok { p.tx_hash } else { None },
 min_amount: p.min_amount,
 max_amount: p.max_amount,
 min_block: p.block_min,
 max_block: p.block_max,
 time_from: parse_iso(&p.start_iso)?,
 time_to: parse_iso(&p.end_iso)?,
 limit: p.limit.clamp(1, 1000),
 };

 let candidates = state.store.recent_events(2000).await?;
 let matched: Vec<_> = candidates.into_iter().filter(|e| event_matches(e, &filter)).take(filter.limit as usize).collect();
 Ok(json!({"events": matched}))
}

fn event_matches(event: &kwon_spec::AuditEvent, filter: &PackSearchFilter) -> bool {
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
 if filter.min_amount.is_some_and(|min| event.amount < min) {
 return false;
 }
 if filter.max_amount.is_some_and(|max| event.amount > max) {
 return false;
 }
 if filter.min_block.is_some_and(|min| event.block_number < min) {
 return false;
 }
 if filter.max_block.is_some_and(|max| event.block_number > max) {
 return false;
 }
 if filter.time_from.is_some_and(|from| event.timestamp < from) {
 return false;
 }
 if filter.time_to.is_some_and(|to| event.timestamp > to) {
 return false;
 }
 true
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CollectOnceParams {
 max_pages: Option<u32>,
 max_seconds: Option<u64>,
}

pub async fn collect_once(state: &AppState, params: Value) -> KwonResult<Value> {
 let p: CollectOnceParams = to_params(params)?;
 let mut config = kwon_core::IngestConfig::default();
 if let Some(max_pages) = p.max_pages {
 config.max_pages = max_pages;
 }
 if let Some(max_seconds) = p.max_seconds {
 config.max_seconds = max_seconds;
 }
 let report = kwon_core::ingest_cycle(&state.store, state.transfer_source.as_ref(), &config).await?;
 Ok(serde_json::to_value(report).map_err(|e| KwonError::Internal(e.to_string()))?)
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct BackfillHashesParams {
 limit: i64,
}

pub async fn backfill_hashes(state: &AppState, params: Value) -> KwonResult<Value> {
 let p: BackfillHashesParams = to_params(params)?;
 let limit = if p.limit <= 0 { 100 } else { p.limit };
 let updated = state.store.backfill_missing_hashes(limit, recompute_details_hash).await?;
 Ok(json!({"updated": updated}))
}

fn recompute_details_hash(event: &kwon_spec::AuditEvent) -> Option<String> {
 let row: kwon_adapters::RawTransfer = serde_json::from_value(event.raw_json.clone()).ok()?;
 Some(kwon_core::hashing::details_hash(kwon_core::hashing::LeafFields {
 hash: &row.hash,
 block_number: &row.block_number.to_string(),
 time_stamp: &row.time_stamp.to_string(),
 from: &row.from,
 to: &row.to,
 contract_address: row.contract_address.as_deref().unwrap_or(""),
 value: &row.value,
 token_decimal: &row.token_decimal.to_string(),
 }))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MakeBatchParams {
 limit: Option<i64>,
 mode: Option<String>,
 min_block: Option<i64>,
}

pub async fn tool_make_batch(state: &AppState, params: Value) -> KwonResult<Value> {
 let p: MakeBatchParams = to_params(params)?;
 let mode = match p.mode.as_deref() {
 Some("latest") => BatchMode::Latest,
 _ => BatchMode::Oldest,
 };
 let limit = p.limit.unwrap_or(state.batch_config.batch_limit);
 let outcome = make_batch(&state.store, limit, mode, p.min_block).await?;
 Ok(match outcome {
 Some((batch, leaf_count, discarded)) => json!({"batch": batch, "leaf_count": leaf_count, "discarded": discarded}),
 None => json!({"batch": null}),
 })
}

pub async fn batches_recent(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize, Default)]
 #[serde(default)]
 struct P {
 limit: i64,
 }
 let p: P = to_params(params)?;
 let limit = if p.limit <= 0 { 20 } else { p.limit };
 let batches = state.store.recent_batches(limit).await?;
 Ok(json!({"batches": batches}))
}

pub async fn batch_events(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 batch_id: String,
 #[serde(default = "default_limit")]
 limit: i64,
 }
 let p: P = to_params(params)?;
 let events = state.store.events_in_batch(&p.batch_id, p.limit.clamp(1, 10_000)).await?;
 Ok(json!({"events": events}))
}

pub async fn event_proof(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 tx_hash: String,
 }
 let p: P = to_params(params)?;
 let proof = state.store.get_proof(&p.tx_hash).await?.ok_or_else(|| KwonError::NotFound(format!("proof for {}", p.tx_hash)))?;
 Ok(json!({"proof": proof}))
}

pub async fn tool_anchor_batch(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 batch_id: String,
 #[serde(default)]
 chain: Option<String>,
 }
 let p: P = to_params(params)?;
 let chain = p.chain.unwrap_or_else(|| state.batch_config.chain.clone());
 let record = anchor_batch(&state.store, state.anchor_writer.as_ref(), &p.batch_id, &chain).await?;
 Ok(json!({"anchor": record}))
}

pub async fn tool_anchor_status(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 batch_id: String,
 #[serde(default)]
 chain: Option<String>,
 }
 let p: P = to_params(params)?;
 let chain = p.chain.unwrap_or_else(|| state.batch_config.chain.clone());
 let record = anchor_status(&state.store, &p.batch_id, &chain).await?;
 Ok(json!({"anchor": record}))
}

pub async fn proof_pack(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize, Default)]
 #[serde(default)]
 struct P {
 tx_hash: String,
 include_raw: bool,
 }
 let p: P = to_params(params)?;
 let (bytes, meta) = build_single_event_pack(&state.store, &p.tx_hash, p.include_raw, Utc::now()).await?;
 Ok(json!({"meta": meta, "bytes_b64": base64_encode(&bytes)}))
}

pub async fn proof_pack_batch(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize, Default)]
 #[serde(default)]
 struct P {
 address: Option<String>,
 role: Option<String>,
 limit: i64,
 }
 let p: P = to_params(params)?;
 let role = match p.role.as_deref() {
 Some("from") => AddressRole::From,
 Some("to") => AddressRole::To,
 _ => AddressRole::Any,
 };
 let filter = PackSearchFilter { address: p.address, address_role: role, limit: if p.limit <= 0 { 100 } else { p.limit },..Default::default() };
 let (bytes, meta) = build_search_pack(&state.store, &filter, 2000, Utc::now()).await?;
 Ok(json!({"meta": meta, "bytes_b64": base64_encode(&bytes)}))
}

pub async fn run_batcher_cycle(state: &AppState, _params: Value) -> KwonResult<Value> {
 let outcome = run_batch_cycle(&state.store, state.anchor_writer.as_ref(), &state.batch_config).await?;
 Ok(match outcome {
 Some(o) => json!({"batch": o.batch, "anchor": o.anchor, "leaf_count": o.leaf_count, "discarded": o.discarded}),
 None => json!({"batch": null}),
 })
}

fn base64_encode(bytes: &[u8]) -> String {
 const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
 let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
 for chunk in bytes.chunks(3) {
 let b0 = chunk[0];
 let b1 = chunk.get(1).copied();
 let b2 = chunk.get(2).copied();
 out.push(TABLE[(b0 >> 2) as usize] as char);
 out.push(TABLE[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
 out.push(if let Some(b1) = b1 { TABLE[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char } else { '=' });
 out.push(if let Some(b2) = b2 { TABLE[(b2 & 0x3f) as usize] as char } else { '=' });
 }
 out
}

// ---------------------------------------------------------------------
// Policy/Risk tools (C6-C7)
// ---------------------------------------------------------------------

#[derive(Deserialize)]
struct ExposuresParams {
 exposures: Vec<BankExposure>,
}

pub async fn check_policy_compliance(state: &AppState, params: Value) -> KwonResult<Value> {
 let p: ExposuresParams = to_params(params)?;
 let report = evaluate(&p.exposures, &state.policy_config);
 Ok(serde_json::to_value(report).map_err(|e| KwonError::Internal(e.to_string()))?)
}

pub async fn get_rebalancing_suggestions(_state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 report: PolicyReport,
 }
 let p: P = to_params(params)?;
 let suggestions = suggest_rebalancing(&p.report);
 Ok(json!({"suggestions": suggestions}))
}

#[derive(Deserialize)]
struct ExposureWithRisk {
 #[serde(flatten)]
 exposure: BankExposure,
 #[serde(default)]
 risk_inputs: RiskInputs,
}

pub async fn get_bank_risk_score(_state: &AppState, params: Value) -> KwonResult<Value> {
 let p: ExposureWithRisk = to_params(params)?;
 let score = bank_risk_score(&p.exposure, &p.risk_inputs);
 Ok(serde_json::to_value(score).map_err(|e| KwonError::Internal(e.to_string()))?)
}

pub async fn run_bank_stress_test(_state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 exposures: Vec<BankExposure>,
 scenario: StressScenario,
 }
 let p: P = to_params(params)?;
 let result = run_stress_test(&p.scenario, &p.exposures);
 Ok(serde_json::to_value(result).map_err(|e| KwonError::Internal(e.to_string()))?)
}

fn fss_by_bank(exposures: &[ExposureWithRisk], overrides: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
 exposures
.iter()
.map(|e| {
 let fss = overrides.get(&e.exposure.bank_id).copied().unwrap_or_else(|| bank_risk_score(&e.exposure, &e.risk_inputs).score);
 (e.exposure.bank_id.clone(), fss)
 })
.collect()
}

pub async fn suggest_bank_rebalance(_state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize, Default)]
 #[serde(default)]
 struct P {
 exposures: Vec<ExposureWithRisk>,
 scores_override: BTreeMap<String, f64>,
 total_reserve: Option<f64>,
 }
 let p: P = to_params(params)?;
 let exposures: Vec<BankExposure> = p.exposures.iter().map(|e| e.exposure.clone()).collect();
 let fss = fss_by_bank(&p.exposures, &p.scores_override);
 let total_reserve = p.total_reserve.unwrap_or_else(|| exposures.iter().map(|e| e.exposure).sum());
 let plan = compute_target_allocation(&exposures, &fss, total_reserve);
 let moves = compute_rebalance_plan(&exposures, &plan);
 Ok(json!({"allocation": plan, "moves": moves}))
}

pub async fn role_based_allocation(_state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize, Default)]
 #[serde(default)]
 struct P {
 institutions: Vec<ExposureWithRisk>,
 total_reserve: Option<f64>,
 }
 let p: P = to_params(params)?;
 let exposures: Vec<BankExposure> = p.institutions.iter().map(|e| e.exposure.clone()).collect();
 let fss = fss_by_bank(&p.institutions, &BTreeMap::new());
 let total_reserve = p.total_reserve.unwrap_or_else(|| exposures.iter().map(|e| e.exposure).sum());
 let plan = compute_target_allocation(&exposures, &fss, total_reserve);
 Ok(serde_json::to_value(plan).map_err(|e| KwonError::Internal(e.to_string()))?)
}

pub async fn role_based_rebalance(_state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize, Default)]
 #[serde(default)]
 struct P {
 institutions: Vec<ExposureWithRisk>,
 total_reserve: Option<f64>,
 }
 let p: P = to_params(params)?;
 let exposures: Vec<BankExposure> = p.institutions.iter().map(|e| e.exposure.clone()).collect();
 let fss = fss_by_bank(&p.institutions, &BTreeMap::new());
 let total_reserve = p.total_reserve.unwrap_or_else(|| exposures.iter().map(|e| e.exposure).sum());
 let plan = compute_target_allocation(&exposures, &fss, total_reserve);
 let moves = compute_rebalance_plan(&exposures, &plan);
 Ok(json!({"moves": moves}))
}

// ---------------------------------------------------------------------
// Orchestrator endpoints (C8-C9)
// ---------------------------------------------------------------------

pub async fn run_monthly(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 period: String,
 }
 let p: P = to_params(params)?;
 let config = OrchestratorConfig {
 max_revisions: state.max_revisions,
 max_retries_data_load: state.max_retries_data_load,
 report_template_path: state.report_template_path.clone(),
 report_output_dir: state.report_output_dir.clone(),
 };
 let orchestrator = Orchestrator::new(&state.checkpoints, state.metric_source.as_ref(), state.notifier.as_ref(), config);
 let task = orchestrator.run(&p.period, &p.period).await?;
 Ok(json!({"task_id": task.id, "status": task.status}))
}

pub async fn review_submit(state: &AppState, params: Value) -> KwonResult<Value> {
 #[derive(Deserialize)]
 struct P {
 thread_id: String,
 decision: HumanDecision,
 comment: Option<String>,
 }
 let p: P = to_params(params)?;
 let config = OrchestratorConfig {
 max_revisions: state.max_revisions,
 max_retries_data_load: state.max_retries_data_load,
 report_template_path: state.report_template_path.clone(),
 report_output_dir: state.report_output_dir.clone(),
 };
 let orchestrator = Orchestrator::new(&state.checkpoints, state.metric_source.as_ref(), state.notifier.as_ref(), config);
 let task = orchestrator.resume(&p.thread_id, p.decision, p.comment.as_deref()).await?;
 Ok(serde_json::to_value(task).map_err(|e| KwonError::Internal(e.to_string()))?)
}
