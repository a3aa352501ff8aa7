//! Wires the pure graph (`graph`), the durable checkpoint store
//! (`checkpoint`), and the external adapters (`kwon_adapters`) into the
//! orchestrator's two public entry points: `run` (start a new monthly
//! workflow instance) and `resume` (supply a human decision at the
//! `human_review` interrupt point), notifying the reviewer and then
//! waiting for their decision before advancing past that stage.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use kwon_adapters::{MetricSource, Notifier};
use kwon_spec::{HumanDecision, HumanReviewStatus, HumanReviewTask, KwonError, KwonResult, MonthlyState};

use crate::checkpoint::CheckpointStore;
use crate::graph::{self, Stage};
use crate::report;

/// Orchestrator-wide configuration.
pub struct OrchestratorConfig {
 pub max_revisions: u32,
 pub max_retries_data_load: u32,
 pub report_template_path: Option<PathBuf>,
 pub report_output_dir: PathBuf,
}

impl Default for OrchestratorConfig {
 fn default() -> Self {
 Self { max_revisions: 3, max_retries_data_load: 3, report_template_path: None, report_output_dir: PathBuf::from("reports") }
 }
}

/// Coordinates one monthly compliance workflow's lifecycle.
pub struct Orchestrator<'a> {
 checkpoints: &'a CheckpointStore,
 metrics: &'a dyn MetricSource,
 notifier: &'a dyn Notifier,
 config: OrchestratorConfig,
 task_ids: AtomicI64,
}

impl<'a> Orchestrator<'a> {
 pub fn new(checkpoints: &'a CheckpointStore, metrics: &'a dyn MetricSource, notifier: &'a dyn Notifier, config: OrchestratorConfig) -> Self {
 Self { checkpoints, metrics, notifier, config, task_ids: AtomicI64::new(1) }
 }

 /// Starts a new workflow instance for `period`, identified by
 /// `thread_id`, driving it up to the `human_review` interrupt (or a
 /// terminal failure) and persisting a checkpoint at each step.
 pub async fn run(&self, thread_id: &str, period: &str) -> KwonResult<HumanReviewTask> {
 let metrics = self.metrics.metrics_for_period(period).await?;
 let state = graph::load_period_data(period, &metrics, self.config.max_revisions, self.config.max_retries_data_load);
 self.checkpoints.create(thread_id, Stage::LoadPeriodData, &state).await?;

 let (final_state, stage) = graph::advance(state, Stage::LoadPeriodData, Some(&metrics));
 let mut checkpoint = self.checkpoints.get(thread_id).await?.ok_or_else(|| KwonError::CheckpointMissing(thread_id.to_string()))?;
 checkpoint = self.checkpoints.advance(thread_id, checkpoint.version, stage, &final_state).await?;

 self.finish_stage(thread_id, checkpoint.version, stage, final_state).await
 }

 /// Resumes a workflow paused at `human_review`, applying the
 /// reviewer's `decision`/`comment` and driving the graph to its next
 /// interrupt or terminal stage.
 pub async fn resume(&self, thread_id: &str, decision: HumanDecision, comment: Option<&str>) -> KwonResult<HumanReviewTask> {
 let checkpoint = self.checkpoints.get(thread_id).await?.ok_or_else(|| KwonError::CheckpointMissing(thread_id.to_string()))?;
 if checkpoint.stage != Stage::HumanReview {
 return Err(KwonError::Validation(format!("thread {thread_id} is not awaiting human review (at stage {:?})", checkpoint.stage)));
 }

 let mut state = checkpoint.state;
 state.human_decision = Some(decision);
 state.human_feedback = comment.map(str::to_string);

 let (routed_stage, routed_state) = graph::route_after_human_review(&state);
 let next_checkpoint = self.checkpoints.advance(thread_id, checkpoint.version, routed_stage, &routed_state).await?;

 let (final_state, final_stage) = graph::advance(routed_state, routed_stage, None);
 let final_checkpoint = self.checkpoints.advance(thread_id, next_checkpoint.version, final_stage, &final_state).await?;

 // `NotifyApproved` is the terminal stage both for an actual approval and
 // for a revise that hit the revision-limit terminal (which still routes
 // to notification, per the error taxonomy's `RevisionLimitReached`).
 if final_stage == Stage::NotifyApproved {
 let task_id = self.task_ids.fetch_add(1, Ordering::SeqCst);
 let report_path = final_state.report_path.clone().unwrap_or_default();
 self.notifier.notify_decision(task_id, &final_state.period, decision, comment, &report_path).await?;
 }

 self.finish_stage(thread_id, final_checkpoint.version, final_stage, final_state).await
 }

 async fn finish_stage(&self, thread_id: &str, version: i64, stage: Stage, state: MonthlyState) -> KwonResult<HumanReviewTask> {
 match stage {
 Stage::HumanReview => {
 let report_path = report::write_report(&state, self.config.report_template_path.as_deref(), &self.config.report_output_dir)?;
 let mut with_path = state.clone();
 with_path.report_path = Some(report_path.clone());
 self.checkpoints.advance(thread_id, version, Stage::HumanReview, &with_path).await?;

 let task_id = self.task_ids.fetch_add(1, Ordering::SeqCst);
 let summary_json = serde_json::to_value(&with_path.summary).unwrap_or(serde_json::Value::Null);
 let task = HumanReviewTask {
 id: task_id,
 period: with_path.period.clone(),
 status: HumanReviewStatus::Pending,
 report_path: report_path.clone(),
 summary_json: summary_json.to_string(),
 flow_run_id: thread_id.to_string(),
 checkpoint_id: Some(version),
 revision_count: with_path.revision_count,
 last_decision: None,
 reviewer: None,
 comment: None,
 created_at: chrono::Utc::now(),
 updated_at: chrono::Utc::now(),
 };
 self.notifier.notify_human_review(&task, &summary_json, &report_path).await?;
 Ok(task)
 }
 Stage::DataQualityFail | Stage::NotifyApproved | Stage::Done => {
 let status = if stage == Stage::DataQualityFail { HumanReviewStatus::Rejected } else { HumanReviewStatus::Completed };
 let summary_json = serde_json::to_value(&state.summary).unwrap_or(serde_json::Value::Null);
 Ok(HumanReviewTask {
 id: 0,
 period: state.period.clone(),
 status,
 report_path: state.report_path.clone().unwrap_or_default(),
 summary_json: summary_json.to_string(),
 flow_run_id: thread_id.to_string(),
 checkpoint_id: Some(version),
 revision_count: state.revision_count,
 last_decision: state.human_decision,
 reviewer: None,
 comment: state.human_feedback.clone(),
 created_at: chrono::Utc::now(),
 updated_at: chrono::Utc::now(),
 })
 }
 other => Err(KwonError::Internal(format!("orchestrator stopped mid-graph at unexpected stage {other:?}"))),
 }
 }
}

/// Renders a report directly from an already-terminal `MonthlyState`
/// without going through the graph — used by `kwond`'s `report.render()`
/// tool for ad-hoc regeneration.
pub fn render_report_now(state: &MonthlyState, template_path: Option<&Path>, output_dir: &Path) -> KwonResult<String> {
 report::write_report(state, template_path, output_dir)
}
