//! Speed-layer polling: checkpoints, signals and hand-off to analysis.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

use capitolwatch_common::{AnalysisSourceType, JobStatus, JobTrigger, Layer, SourceDescriptor};
use capitolwatch_ingest::intelligence::AnalysisQueue;
use capitolwatch_ingest::speed::{Platform, SpeedCoordinator};
use capitolwatch_ingest::store::{EntityStore, MemoryStore};
use capitolwatch_ingest::connectors::SourceConnector;
use capitolwatch_ingest::testing::{
    bill_entity, test_deps_with_store, FlakyStore, MockConnector, UpstreamConnector,
};
use capitolwatch_ingest::IngestDeps;

fn post(id: &str, text: &str, at: DateTime<Utc>) -> Value {
    json!({"id": id, "text": text, "created_at": at.to_rfc3339()})
}

async fn coordinator(
    store: Arc<dyn EntityStore>,
    connector: MockConnector,
) -> (SpeedCoordinator, IngestDeps) {
    social(store, Arc::new(connector)).await
}

async fn social(
    store: Arc<dyn EntityStore>,
    connector: Arc<dyn SourceConnector>,
) -> (SpeedCoordinator, IngestDeps) {
    let deps = test_deps_with_store(store);
    deps.registry
        .register(SourceDescriptor::new("speed-social", "Social", Layer::Speed))
        .await;
    let platform = Platform {
        name: "social".into(),
        source_id: "speed-social".into(),
        connector,
    };
    let coordinator =
        SpeedCoordinator::new(deps.clone(), vec![platform], Duration::from_secs(300));
    (coordinator, deps)
}

#[tokio::test]
async fn checkpoint_never_moves_backwards() {
    let start = Utc::now() - ChronoDuration::hours(2);
    let t = |mins: i64| start + ChronoDuration::minutes(mins);
    let connector = MockConnector::new("social")
        .then_ok(vec![post("1", "HB25-1001 hearing today", t(10))])
        .then_ok(vec![
            // Older than the checkpoint: ignored.
            post("0", "HB25-1001 old news", t(5)),
            post("2", "Lunch", t(30)),
        ])
        .then_ok(vec![])
        .then_ok(vec![post("1", "HB25-1001 hearing today", t(10))]);
    let store = Arc::new(MemoryStore::new());
    let (coordinator, deps) = coordinator(store.clone(), connector).await;
    deps.checkpoints.advance("social", start).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let job = coordinator
            .poll_platform("social", JobTrigger::Schedule)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        seen.push(deps.checkpoints.get("social").await.unwrap().unwrap());
    }

    assert_eq!(seen, vec![t(10), t(30), t(30), t(30)]);
    // The replayed item from the last poll was filtered, not re-signalled.
    assert_eq!(store.list_signals().await.len(), 1);
}

#[tokio::test]
async fn failed_item_holds_the_checkpoint_but_later_items_still_run() {
    let start = Utc::now() - ChronoDuration::hours(1);
    let t = |mins: i64| start + ChronoDuration::minutes(mins);
    let connector = MockConnector::new("social").then_ok(vec![
        post("a", "HB25-1001 advances", t(1)),
        post("b", "SB25-002 stalls", t(2)),
        post("c", "HB25-1003 signed", t(3)),
    ]);
    let store = Arc::new(FlakyStore::new().signals_fail_after(1));
    let (coordinator, deps) = coordinator(store.clone(), connector).await;
    deps.checkpoints.advance("social", start).await.unwrap();

    let job = coordinator
        .poll_platform("social", JobTrigger::Schedule)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.counts.records_seen, 3);
    assert_eq!(job.counts.records_added, 1);
    assert_eq!(job.counts.errors, 2);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(deps.checkpoints.get("social").await.unwrap(), Some(t(1)));
}

#[tokio::test]
async fn item_sharing_a_timestamp_with_a_failure_is_retried() {
    let start = Utc::now() - ChronoDuration::hours(1);
    let t = start + ChronoDuration::minutes(10);
    let upstream = Arc::new(UpstreamConnector::new("social", "created_at").with_records(vec![
        post("a", "HB25-1001 advances", t),
        post("b", "SB25-002 stalls", t),
    ]));
    let store = Arc::new(FlakyStore::new().signals_fail_after(1));
    let (coordinator, deps) = social(store.clone(), upstream.clone()).await;
    deps.checkpoints.advance("social", start).await.unwrap();

    let first = coordinator
        .poll_platform("social", JobTrigger::Schedule)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.counts.records_added, 1);
    assert_eq!(first.counts.errors, 1);
    let held = deps.checkpoints.get("social").await.unwrap().unwrap();
    assert!(held < t);

    store.heal();
    let second = coordinator
        .poll_platform("social", JobTrigger::Schedule)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.counts.records_seen, 2);
    assert_eq!(second.counts.errors, 0);
    assert_eq!(deps.checkpoints.get("social").await.unwrap(), Some(t));

    let signals = store.inner().list_signals().await;
    assert!(signals.iter().any(|s| s.external_id == "b"));
}

#[tokio::test]
async fn truncated_poll_keeps_the_checkpoint() {
    let start = Utc::now() - ChronoDuration::hours(1);
    let t = |mins: i64| start + ChronoDuration::minutes(mins);
    let upstream = Arc::new(
        UpstreamConnector::new("social", "created_at")
            .with_records(vec![
                post("1", "HB25-1001 one", t(1)),
                post("2", "HB25-1001 two", t(2)),
                post("3", "HB25-1001 three", t(3)),
            ])
            .with_limit(2),
    );
    let (coordinator, deps) = social(Arc::new(MemoryStore::new()), upstream).await;
    deps.checkpoints.advance("social", start).await.unwrap();

    let job = coordinator
        .poll_platform("social", JobTrigger::Schedule)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.counts.records_seen, 2);
    assert_eq!(job.metadata["checkpoint_held"], "truncated");
    assert_eq!(deps.checkpoints.get("social").await.unwrap(), Some(start));
}

#[tokio::test]
async fn relevant_items_are_queued_for_analysis() {
    let start = Utc::now() - ChronoDuration::hours(1);
    let store = Arc::new(MemoryStore::new());
    store
        .upsert(bill_entity("HB25-1001", "Transit funding", Utc::now()))
        .await
        .unwrap();
    let connector = MockConnector::new("social").then_ok(vec![
        post("x", "Rally against HB25-1001 tonight", start + ChronoDuration::minutes(5)),
        post("y", "Nothing legislative here", start + ChronoDuration::minutes(6)),
    ]);
    let deps = test_deps_with_store(store.clone());
    deps.registry
        .register(SourceDescriptor::new("speed-social", "Social", Layer::Speed))
        .await;
    deps.checkpoints.advance("social", start).await.unwrap();
    let queue = Arc::new(AnalysisQueue::new(10));
    let coordinator = SpeedCoordinator::new(
        deps.clone(),
        vec![Platform {
            name: "social".into(),
            source_id: "speed-social".into(),
            connector: Arc::new(connector),
        }],
        Duration::from_secs(300),
    )
    .with_analysis_queue(queue.clone());

    let job = coordinator
        .poll_platform("social", JobTrigger::Schedule)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.metadata["analysis_queued"], 1);

    let queued = queue.take_batch(10).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].source_type, AnalysisSourceType::Signal);
    assert_eq!(queued[0].source_id, "social:x");

    let signals = store.list_signals().await;
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].matched_text, "HB25-1001");
    assert_eq!(signals[0].relevance, 0.6);
}

#[tokio::test(start_paused = true)]
async fn connector_failure_fails_the_job_and_keeps_the_checkpoint() {
    let start = Utc::now() - ChronoDuration::hours(1);
    let connector = MockConnector::new("social").then_err(
        capitolwatch_common::ConnectorError::Unauthorized("bad token".into()),
    );
    let (coordinator, deps) = coordinator(Arc::new(MemoryStore::new()), connector).await;
    deps.checkpoints.advance("social", start).await.unwrap();

    let job = coordinator
        .poll_platform("social", JobTrigger::Schedule)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(deps.checkpoints.get("social").await.unwrap(), Some(start));
    assert_eq!(
        deps.registry
            .get("speed-social")
            .await
            .unwrap()
            .consecutive_errors,
        1
    );
}
