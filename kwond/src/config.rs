//! Environment-variable configuration table, read via `clap`
//! derive + `env` so every tunable can come from either a flag or the
//! process environment.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "K-WON compliance audit backplane tool-server gateway", long_about = None)]
pub struct Cli {
 /// HTTP bind address for the tool-server RPC endpoint.
 #[arg(long, env = "KWOND_BIND_ADDR", default_value = "127.0.0.1:8080")]
 pub bind_addr: String,

 /// Override log level (e.g. info, debug, trace).
 #[arg(long, env = "KWOND_LOG_LEVEL", default_value = "info")]
 pub log_level: String,

 // --- Storage ---
 /// SQLite/Postgres connection string for the audit store and checkpointer.
 #[arg(long, env = "DB_URL", default_value = "sqlite::memory:")]
 pub db_url: String,

 // --- Data source ---
 #[arg(long, env = "USE_LOCAL_SFIAT", default_value_t = true)]
 pub use_local_sfiat: bool,
 #[arg(long, env = "LOCAL_API_BASE")]
 pub local_api_base: Option<String>,
 #[arg(long, env = "LOCAL_TOKEN")]
 pub local_token: Option<String>,
 #[arg(long, env = "LOCAL_ADDRESS_FILTER")]
 pub local_address_filter: Option<String>,
 #[arg(long, env = "ETHERSCAN_API_KEY")]
 pub etherscan_api_key: Option<String>,
 #[arg(long, env = "ETHERSCAN_BASE_URL")]
 pub etherscan_base_url: Option<String>,
 #[arg(long, env = "USDT_CONTRACT")]
 pub usdt_contract: Option<String>,

 // --- Ingestor ---
 #[arg(long, env = "POLL_INTERVAL_SEC", default_value_t = 15)]
 pub poll_interval_sec: u64,
 #[arg(long, env = "COLLECT_MAX_PAGES", default_value_t = 50)]
 pub collect_max_pages: u32,
 #[arg(long, env = "COLLECT_MAX_SECONDS", default_value_t = 30)]
 pub collect_max_seconds: u64,
 #[arg(long, env = "ETHERSCAN_OFFSET", default_value_t = 1000)]
 pub etherscan_offset: u32,
 #[arg(long, env = "ETHERSCAN_RATE_SLEEP", default_value_t = 0)]
 pub etherscan_rate_sleep: u64,

 // --- Batcher/Anchorer ---
 #[arg(long, env = "MERKLE_POLL_INTERVAL_SEC", default_value_t = 30)]
 pub merkle_poll_interval_sec: u64,
 #[arg(long, env = "MERKLE_MIN_PENDING_EVENTS", default_value_t = 1)]
 pub merkle_min_pending_events: i64,
 #[arg(long, env = "MERKLE_BATCH_LIMIT", default_value_t = 500)]
 pub merkle_batch_limit: i64,
 #[arg(long, env = "MERKLE_BATCH_MODE", default_value = "oldest")]
 pub merkle_batch_mode: String,
 #[arg(long, env = "ANCHOR_CHAIN", default_value = "default")]
 pub anchor_chain: String,
 #[arg(long, env = "ANCHOR_TX_PREFIX", default_value = "mock-")]
 pub anchor_tx_prefix: String,

 // --- Orchestrator ---
 #[arg(long, env = "REPORT_ARTIFACTS_DIR", default_value = "reports")]
 pub report_artifacts_dir: String,
 #[arg(long, env = "REPORT_TEMPLATE_PATH")]
 pub report_template_path: Option<String>,
 #[arg(long, env = "MAX_REVISIONS", default_value_t = 3)]
 pub max_revisions: u32,
 #[arg(long, env = "MAX_RETRIES_DATA_LOAD", default_value_t = 3)]
 pub max_retries_data_load: u32,
}
