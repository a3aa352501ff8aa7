//! `kwond`: the K-WON compliance audit backplane's tool-server RPC gateway.
//! A small daemon/status-server structure where `{tool, params}` dispatches
//! to a typed handler in `handlers`. Dispatch itself is a plain match
//! rather than an indirection table, since every handler has the same
//! `(&AppState, Value) -> KwonResult<Value>` shape and async fn pointers
//! don't erase to a uniform type cheaply.

mod config;
mod handlers;
mod metrics;
mod state;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use config::Cli;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use state::AppState;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Every registered tool name, surfaced verbatim by `GET /health`.
const TOOL_NAMES: &[&str] = &[
 "sync_state",
 "events_recent",
 "event_detail",
 "events_search",
 "collect_once",
 "backfill_hashes",
 "make_batch",
 "run_batcher_cycle",
 "batches_recent",
 "batch_events",
 "event_proof",
 "anchor_batch",
 "anchor_status",
 "proof_pack",
 "proof_pack_batch",
 "check_policy_compliance",
 "get_rebalancing_suggestions",
 "get_bank_risk_score",
 "run_bank_stress_test",
 "suggest_bank_rebalance",
 "role_based_allocation",
 "role_based_rebalance",
 "run",
 "review_submit",
];

#[derive(Deserialize)]
struct ToolRequest {
 tool: String,
 #[serde(default)]
 params: Value,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ToolResponse {
 Ok { success: bool, result: Value },
 Err { success: bool, error: String },
}

#[derive(Serialize)]
struct HealthReport {
 status: &'static str,
 tools: &'static [&'static str],
}

async fn call_tool(app: &AppState, tool: &str, params: Value) -> kwon_spec::KwonResult<Value> {
 match tool {
 "sync_state" => handlers::sync_state(app, params).await,
 "events_recent" => handlers::events_recent(app, params).await,
 "event_detail" => handlers::event_detail(app, params).await,
 "events_search" => handlers::events_search(app, params).await,
 "collect_once" => handlers::collect_once(app, params).await,
 "backfill_hashes" => handlers::backfill_hashes(app, params).await,
 "make_batch" => handlers::tool_make_batch(app, params).await,
 "run_batcher_cycle" => handlers::run_batcher_cycle(app, params).await,
 "batches_recent" => handlers::batches_recent(app, params).await,
 "batch_events" => handlers::batch_events(app, params).await,
 "event_proof" => handlers::event_proof(app, params).await,
 "anchor_batch" => handlers::tool_anchor_batch(app, params).await,
 "anchor_status" => handlers::tool_anchor_status(app, params).await,
 "proof_pack" => handlers::proof_pack(app, params).await,
 "proof_pack_batch" => handlers::proof_pack_batch(app, params).await,
 "check_policy_compliance" => handlers::check_policy_compliance(app, params).await,
 "get_rebalancing_suggestions" => handlers::get_rebalancing_suggestions(app, params).await,
 "get_bank_risk_score" => handlers::get_bank_risk_score(app, params).await,
 "run_bank_stress_test" => handlers::run_bank_stress_test(app, params).await,
 "suggest_bank_rebalance" => handlers::suggest_bank_rebalance(app, params).await,
 "role_based_allocation" => handlers::role_based_allocation(app, params).await,
 "role_based_rebalance" => handlers::role_based_rebalance(app, params).await,
 "run" => handlers::run_monthly(app, params).await,
 "review_submit" => handlers::review_submit(app, params).await,
 other => Err(kwon_spec::KwonError::UnknownTool(other.to_string())),
 }
}

async fn dispatch(State(app): State<Arc<AppState>>, Json(request): Json<ToolRequest>) -> impl IntoResponse {
 let start = std::time::Instant::now();
 let outcome = call_tool(&app, &request.tool, request.params).await;
 let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

 match outcome {
 Ok(result) => {
 app.metrics.record(&request.tool, latency_ms, false);
 (StatusCode::OK, Json(ToolResponse::Ok { success: true, result }))
 }
 Err(err) => {
 app.metrics.record(&request.tool, latency_ms, true);
 let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
 tracing::warn!(tool = %request.tool, error = %err, "tool call failed");
 (status, Json(ToolResponse::Err { success: false, error: err.to_string() }))
 }
 }
}

async fn dispatch_by_path(State(app): State<Arc<AppState>>, Path(name): Path<String>, Json(params): Json<Value>) -> impl IntoResponse {
 dispatch(State(app), Json(ToolRequest { tool: name, params })).await
}

async fn health() -> impl IntoResponse {
 Json(HealthReport { status: "healthy", tools: TOOL_NAMES })
}

async fn metrics_endpoint(State(app): State<Arc<AppState>>) -> impl IntoResponse {
 match app.metrics.render() {
 Ok(body) => (StatusCode::OK, body).into_response(),
 Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {err}")).into_response(),
 }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
 let cli = Cli::parse();

 let level = match cli.log_level.to_ascii_uppercase().as_str() {
 "TRACE" => Level::TRACE,
 "DEBUG" => Level::DEBUG,
 "WARN" => Level::WARN,
 "ERROR" => Level::ERROR,
 _ => Level::INFO,
 };
 let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
 let subscriber = FmtSubscriber::builder().with_max_level(level).with_env_filter(env_filter).finish();
 tracing::subscriber::set_global_default(subscriber)?;

 let app_state = Arc::new(AppState::from_config(&cli).await?);

 let router = Router::new()
.route("/tools/:name", post(dispatch_by_path))
.route("/rpc", post(dispatch))
.route("/health", get(health))
.route("/metrics", get(metrics_endpoint))
.with_state(app_state);

 let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await?;
 info!(addr = %cli.bind_addr, "kwond gateway listening");
 axum::serve(listener, router.into_make_service()).await?;
 Ok(())
}
