//! Durable checkpoint store for the monthly orchestrator:
//! one row per `(thread_id, version)`, advanced with optimistic
//! concurrency so a crashed worker can resume without double-applying a
//! stage. Uses the same `sqlx`/manual-row-mapping style as the audit store.

use chrono::{DateTime, Utc};
use kwon_spec::{KwonError, KwonResult, MonthlyState};
use sqlx::{Row, SqlitePool};

use crate::graph::Stage;

/// One durable snapshot of an in-flight workflow instance.
#[derive(Debug, Clone)]
pub struct Checkpoint {
 pub thread_id: String,
 pub version: i64,
 pub stage: Stage,
 pub state: MonthlyState,
 pub updated_at: DateTime<Utc>,
}

/// `sqlx`-backed checkpoint table, co-locatable in the same pool as the
/// audit store.
pub struct CheckpointStore {
 pool: SqlitePool,
}

impl CheckpointStore {
 pub async fn connect(pool: SqlitePool) -> KwonResult<Self> {
 let store = Self { pool };
 store.ensure_schema().await?;
 Ok(store)
 }

 async fn ensure_schema(&self) -> KwonResult<()> {
 sqlx::query(
 r#"
 CREATE TABLE IF NOT EXISTS orchestrator_checkpoints (
 thread_id TEXT PRIMARY KEY,
 version INTEGER NOT NULL,
 stage TEXT NOT NULL,
 state_json TEXT NOT NULL,
 updated_at TEXT NOT NULL
)
 "#,
)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(())
 }

 /// Loads the latest checkpoint for `thread_id`, if any.
 pub async fn get(&self, thread_id: &str) -> KwonResult<Option<Checkpoint>> {
 let row = sqlx::query("SELECT thread_id, version, stage, state_json, updated_at FROM orchestrator_checkpoints WHERE thread_id = ?1")
.bind(thread_id)
.fetch_optional(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 row.map(row_to_checkpoint).transpose()
 }

 /// Inserts the first checkpoint for a brand-new `thread_id`.
 pub async fn create(&self, thread_id: &str, stage: Stage, state: &MonthlyState) -> KwonResult<Checkpoint> {
 let stage_str = serde_json::to_string(&stage).map_err(|e| KwonError::Internal(e.to_string()))?;
 let state_json = serde_json::to_string(state).map_err(|e| KwonError::Internal(e.to_string()))?;
 let now = Utc::now();
 sqlx::query("INSERT INTO orchestrator_checkpoints (thread_id, version, stage, state_json, updated_at) VALUES (?1, 1, ?2, ?3, ?4)")
.bind(thread_id)
.bind(&stage_str)
.bind(&state_json)
.bind(now.to_rfc3339())
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;
 Ok(Checkpoint { thread_id: thread_id.to_string(), version: 1, stage, state: state.clone(), updated_at: now })
 }

 /// Advances `thread_id` from `expected_version` to `expected_version + 1`.
 /// Returns [`KwonError::CheckpointMissing`] if the row is gone, and
 /// [`KwonError::Validation`] on a version mismatch (another worker has
 /// already advanced this thread — the caller should reload and retry).
 pub async fn advance(&self, thread_id: &str, expected_version: i64, stage: Stage, state: &MonthlyState) -> KwonResult<Checkpoint> {
 let stage_str = serde_json::to_string(&stage).map_err(|e| KwonError::Internal(e.to_string()))?;
 let state_json = serde_json::to_string(state).map_err(|e| KwonError::Internal(e.to_string()))?;
 let now = Utc::now();
 let result = sqlx::query(
 "UPDATE orchestrator_checkpoints SET version = version + 1, stage = ?1, state_json = ?2, updated_at = ?3 WHERE thread_id = ?4 AND version = ?5",
)
.bind(&stage_str)
.bind(&state_json)
.bind(now.to_rfc3339())
.bind(thread_id)
.bind(expected_version)
.execute(&self.pool)
.await
.map_err(|e| KwonError::Storage(e.to_string()))?;

 if result.rows_affected() == 0 {
 return match self.get(thread_id).await? {
 Some(_) => Err(KwonError::Validation(format!(
 "checkpoint version conflict for thread {thread_id}: expected {expected_version}"
))),
 None => Err(KwonError::CheckpointMissing(thread_id.to_string())),
 };
 }

 Ok(Checkpoint { thread_id: thread_id.to_string(), version: expected_version + 1, stage, state: state.clone(), updated_at: now })
 }
}

fn row_to_checkpoint(row: sqlx::sqlite::SqliteRow) -> KwonResult<Checkpoint> {
 let stage_str: String = row.try_get("stage").map_err(|e| KwonError::Storage(e.to_string()))?;
 let state_json: String = row.try_get("state_json").map_err(|e| KwonError::Storage(e.to_string()))?;
 let updated_at: String = row.try_get("updated_at").map_err(|e| KwonError::Storage(e.to_string()))?;

 Ok(Checkpoint {
 thread_id: row.try_get("thread_id").map_err(|e| KwonError::Storage(e.to_string()))?,
 version: row.try_get("version").map_err(|e| KwonError::Storage(e.to_string()))?,
 stage: serde_json::from_str(&stage_str).map_err(|e| KwonError::Internal(e.to_string()))?,
 state: serde_json::from_str(&state_json).map_err(|e| KwonError::Internal(e.to_string()))?,
 updated_at: DateTime::parse_from_rfc3339(&updated_at).map_err(|e| KwonError::Internal(e.to_string()))?.with_timezone(&Utc),
 })
}

#[cfg(test)]
mod tests {
 use super::*;
 use crate::graph::load_period_data;
 use kwon_adapters::StaticMetricSource;

 async fn store() -> CheckpointStore {
 let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
 CheckpointStore::connect(pool).await.unwrap()
 }

 fn state() -> MonthlyState {
 let metrics = kwon_adapters::MonthlyMetrics {
 avg_collateral_ratio: 1.1,
 min_collateral_ratio: 1.0,
 avg_peg_deviation: 0.001,
 peg_alert_count: 0,
 avg_liquidity_ratio: 0.5,
 avg_por_failure_rate: 0.0,
 days_covered: 30,
 total_days: 30,
 last_update_hours_ago: 1.0,
 sample_counts: Default::default(),
 };
 load_period_data("2026-06", &metrics, 3, 3)
 }

 #[tokio::test]
 async fn create_then_get_round_trips() {
 let cp_store = store().await;
 let _ = StaticMetricSource::healthy(30);
 cp_store.create("thread-1", Stage::LoadPeriodData, &state).await.unwrap();
 let loaded = cp_store.get("thread-1").await.unwrap().unwrap();
 assert_eq!(loaded.version, 1);
 assert_eq!(loaded.stage, Stage::LoadPeriodData);
 }

 #[tokio::test]
 async fn advance_increments_version_and_rejects_stale_version() {
 let cp_store = store().await;
 cp_store.create("thread-2", Stage::LoadPeriodData, &state).await.unwrap();
 cp_store.advance("thread-2", 1, Stage::DataQualityCheck, &state).await.unwrap();
 let loaded = cp_store.get("thread-2").await.unwrap().unwrap();
 assert_eq!(loaded.version, 2);

 let stale = cp_store.advance("thread-2", 1, Stage::DataQualityCheck, &state).await;
 assert!(stale.is_err());
 }

 #[tokio::test]
 async fn advance_on_unknown_thread_is_checkpoint_missing() {
 let cp_store = store().await;
 let err = cp_store.advance("ghost", 1, Stage::DataQualityCheck, &state).await.unwrap_err();
 assert!(matches!(err, KwonError::CheckpointMissing(_)));
 }
}
