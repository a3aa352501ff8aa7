//! Shared, explicitly-constructed dependencies for the gateway, built
//! once at startup and torn down at shutdown rather than held in
//! scattered mutable module-level clients.

use std::sync::Arc;

use kwon_adapters::{AnchorWriter, FixtureTransferSource, MetricSource, MockAnchorWriter, Notifier, NullNotifier, StaticMetricSource, TransferSource};
use kwon_core::{BatchConfig, BatchMode};
use kwon_core::AuditStore;
use kwon_orchestrator::CheckpointStore;
use kwon_policy::PolicyConfig;

use crate::config::Cli;
use crate::metrics::GatewayMetrics;

pub struct AppState {
 pub store: AuditStore,
 pub checkpoints: CheckpointStore,
 pub transfer_source: Arc<dyn TransferSource>,
 pub anchor_writer: Arc<dyn AnchorWriter>,
 pub notifier: Arc<dyn Notifier>,
 pub metric_source: Arc<dyn MetricSource>,
 pub policy_config: PolicyConfig,
 pub batch_config: BatchConfig,
 pub report_template_path: Option<std::path::PathBuf>,
 pub report_output_dir: std::path::PathBuf,
 pub max_revisions: u32,
 pub max_retries_data_load: u32,
 pub metrics: GatewayMetrics,
}

impl AppState {
 pub async fn from_config(cli: &Cli) -> anyhow::Result<Self> {
 let store = AuditStore::connect(&cli.db_url).await?;
 let checkpoints = CheckpointStore::connect(store.pool().clone()).await?;

 let batch_mode = match cli.merkle_batch_mode.to_ascii_lowercase().as_str() {
 "latest" => BatchMode::Latest,
 _ => BatchMode::Oldest,
 };

 Ok(Self {
 store,
 checkpoints,
 // Production transfer/anchor/notification transports are
 // explicitly out of scope; the gateway ships
 // the deterministic mocks until a concrete adapter is wired in.
 transfer_source: Arc::new(FixtureTransferSource::new(vec![], None)),
 anchor_writer: Arc::new(MockAnchorWriter::new(cli.anchor_tx_prefix.clone())),
 notifier: Arc::new(NullNotifier::default()),
 metric_source: Arc::new(StaticMetricSource::healthy(30)),
 policy_config: PolicyConfig::default(),
 batch_config: BatchConfig {
 min_pending_events: cli.merkle_min_pending_events,
 batch_limit: cli.merkle_batch_limit,
 batch_mode,
 min_block: None,
 chain: cli.anchor_chain.clone(),
 anchor_prefix: cli.anchor_tx_prefix.clone(),
 },
 report_template_path: cli.report_template_path.clone().map(std::path::PathBuf::from),
 report_output_dir: std::path::PathBuf::from(&cli.report_artifacts_dir),
 max_revisions: cli.max_revisions,
 max_retries_data_load: cli.max_retries_data_load,
 metrics: GatewayMetrics::new(),
 })
 }
}
