//! End-to-end coverage of the monthly orchestrator through its public
//! `Orchestrator::run`/`resume` entry points: the happy-path approval, and
//! the bounded revise loop hitting `RevisionLimitReached`.

use kwon_adapters::{NullNotifier, StaticMetricSource};
use kwon_core::AuditStore;
use kwon_orchestrator::engine::Orchestrator;
use kwon_orchestrator::{CheckpointStore, OrchestratorConfig};
use kwon_spec::{HumanDecision, HumanReviewStatus};

async fn checkpoints() -> CheckpointStore {
    let store = AuditStore::connect("sqlite::memory:").await.unwrap();
    CheckpointStore::connect(store.pool().clone()).await.unwrap()
}

fn config(max_revisions: u32) -> OrchestratorConfig {
    OrchestratorConfig { max_revisions, max_retries_data_load: 3, report_template_path: None, report_output_dir: std::env::temp_dir().join("kwon-orchestrator-tests") }
}

#[tokio::test]
async fn happy_path_run_then_approve() {
    let checkpoints = checkpoints().await;
    let metrics = StaticMetricSource::healthy(30);
    let notifier = NullNotifier::default();
    let orchestrator = Orchestrator::new(&checkpoints, &metrics, &notifier, config(3));

    let pending = orchestrator.run("thread-2026-06", "2026-06").await.unwrap();
    assert_eq!(pending.status, HumanReviewStatus::Pending);
    assert!(!pending.report_path.is_empty());

    let completed = orchestrator.resume("thread-2026-06", HumanDecision::Approve, None).await.unwrap();
    assert_eq!(completed.status, HumanReviewStatus::Completed);
}

#[tokio::test]
async fn revise_loop_is_bounded_and_terminates_via_notification() {
    let checkpoints = checkpoints().await;
    let metrics = StaticMetricSource::healthy(30);
    let notifier = NullNotifier::default();
    // max_revisions: 0 means the very first Revise decision already exceeds
    // the limit (revision_count becomes 1 > max_revisions 0).
    let orchestrator = Orchestrator::new(&checkpoints, &metrics, &notifier, config(0));

    orchestrator.run("thread-2026-07", "2026-07").await.unwrap();
    let after_revise = orchestrator.resume("thread-2026-07", HumanDecision::Revise, Some("please re-check collateral")).await.unwrap();

    // Hitting the revision limit routes straight to `notify_approved_report`
    // and ends the workflow, rather than re-suspending at `human_review`.
    assert_eq!(after_revise.status, HumanReviewStatus::Completed);
    assert!(after_revise.summary_json.contains("\"PENDING\""));
    assert!(after_revise.summary_json.contains("limit_reached"));
}

#[tokio::test]
async fn three_revises_succeed_then_the_fourth_hits_the_limit() {
    let checkpoints = checkpoints().await;
    let metrics = StaticMetricSource::healthy(30);
    let notifier = NullNotifier::default();
    let orchestrator = Orchestrator::new(&checkpoints, &metrics, &notifier, config(3));

    orchestrator.run("thread-2026-08", "2026-08").await.unwrap();
    for _ in 0..3 {
        let revised = orchestrator.resume("thread-2026-08", HumanDecision::Revise, Some("redo collateral")).await.unwrap();
        assert_eq!(revised.status, HumanReviewStatus::Pending);
        assert!(!revised.summary_json.contains("limit_reached"));
    }

    let limited = orchestrator.resume("thread-2026-08", HumanDecision::Revise, Some("redo collateral again")).await.unwrap();
    assert_eq!(limited.status, HumanReviewStatus::Completed);
    assert_eq!(limited.revision_count, 4);
    assert!(limited.summary_json.contains("\"PENDING\""));
    assert!(limited.summary_json.contains("limit_reached"));
}

#[tokio::test]
async fn resuming_a_thread_not_awaiting_review_is_rejected() {
    let checkpoints = checkpoints().await;
    let metrics = StaticMetricSource::healthy(30);
    let notifier = NullNotifier::default();
    let orchestrator = Orchestrator::new(&checkpoints, &metrics, &notifier, config(3));

    let err = orchestrator.resume("no-such-thread", HumanDecision::Approve, None).await.unwrap_err();
    assert!(matches!(err, kwon_spec::KwonError::CheckpointMissing(_)));
}
