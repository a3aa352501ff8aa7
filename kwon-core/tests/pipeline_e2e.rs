//! End-to-end coverage of the audit pipeline: ingest → batch → anchor →
//! proof pack, plus the duplicate-ingestion guarantee.

use kwon_adapters::{FixtureTransferSource, MockAnchorWriter, RawTransfer};
use kwon_core::{anchor_batch, batch::BatchMode, ingest_cycle, make_batch, AuditStore, IngestConfig};

fn transfer(hash: &str, block: i64, value: &str) -> RawTransfer {
    RawTransfer {
        hash: hash.to_string(),
        block_number: block,
        time_stamp: 1_700_000_000 + block,
        from: "0xFeedFace00000000000000000000000000000001".into(),
        to: "0xFeedFace00000000000000000000000000000002".into(),
        contract_address: Some("0xUsdtContract0000000000000000000000000003".into()),
        value: value.into(),
        token_decimal: 18,
    }
}

#[tokio::test]
async fn ingest_batch_anchor_proof_round_trip() {
    let store = AuditStore::connect("sqlite::memory:").await.unwrap();
    let source = FixtureTransferSource::new(
        vec![vec![transfer("0xAA", 100, "1000000000000000000"), transfer("0xBB", 101, "2000000000000000000"), transfer("0xCC", 102, "3000000000000000000")]],
        Some(200),
    );

    let report = ingest_cycle(&store, &source, &IngestConfig::default()).await.unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(report.skipped, 0);

    let (batch, leaf_count, discarded) = make_batch(&store, 500, BatchMode::Oldest, None).await.unwrap().unwrap();
    assert_eq!(leaf_count, 3);
    assert_eq!(discarded, 0);

    let writer = MockAnchorWriter::default();
    let anchor = anchor_batch(&store, &writer, &batch.batch_id, "default").await.unwrap();
    assert_eq!(anchor.tx_hash, format!("mock-{}", batch.batch_id));

    let events = store.events_in_batch(&batch.batch_id, 10).await.unwrap();
    assert_eq!(events.len(), 3);

    let first = &events[0];
    let proof = store.get_proof(&first.event_id).await.unwrap().expect("proof must exist after batching");
    assert_eq!(proof.batch_id, batch.batch_id);

    let (bytes, meta) = kwon_core::proofpack::build_single_event_pack(&store, &first.event_id, true, chrono::Utc::now()).await.unwrap();
    assert!(!bytes.is_empty());
    assert_eq!(meta.count, 1);
    assert_eq!(meta.bytes as usize, bytes.len());
}

#[tokio::test]
async fn duplicate_ingestion_is_skipped_not_double_counted() {
    let store = AuditStore::connect("sqlite::memory:").await.unwrap();
    let page = vec![transfer("0xDD", 200, "500000000000000000")];
    let source_one = FixtureTransferSource::new(vec![page.clone()], Some(300));
    let first = ingest_cycle(&store, &source_one, &IngestConfig::default()).await.unwrap();
    assert_eq!(first.inserted, 1);

    // A second source replaying the same rows (e.g. an overlapping page
    // fetch after a restart) must not create a second audit event or a
    // second leaf in any future batch.
    let source_two = FixtureTransferSource::new(vec![page], Some(300));
    let second = ingest_cycle(&store, &source_two, &IngestConfig::default()).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 1);

    let (_, leaf_count, _) = make_batch(&store, 500, BatchMode::Oldest, None).await.unwrap().unwrap();
    assert_eq!(leaf_count, 1, "the duplicate row must not appear as a second leaf");
}

#[tokio::test]
async fn anchoring_the_same_batch_twice_is_idempotent() {
    let store = AuditStore::connect("sqlite::memory:").await.unwrap();
    let source = FixtureTransferSource::new(vec![vec![transfer("0xEE", 300, "1000000000000000000")]], Some(400));
    ingest_cycle(&store, &source, &IngestConfig::default()).await.unwrap();
    let (batch, _, _) = make_batch(&store, 500, BatchMode::Oldest, None).await.unwrap().unwrap();

    let writer = MockAnchorWriter::default();
    let a = anchor_batch(&store, &writer, &batch.batch_id, "default").await.unwrap();
    let b = anchor_batch(&store, &writer, &batch.batch_id, "default").await.unwrap();
    assert_eq!(a.tx_hash, b.tx_hash);
    assert_eq!(a.anchored_at, b.anchored_at, "re-anchoring an already-anchored batch must not mint a new timestamp");
}
