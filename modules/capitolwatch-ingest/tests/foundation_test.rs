//! Foundation ticks across several endpoints with scripted connectors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

use capitolwatch_common::{
    ConnectorError, EntityKind, JobStatus, JobTrigger, Layer, NaturalKey, SourceDescriptor,
    SourceStatus,
};
use capitolwatch_ingest::connectors::SourceConnector;
use capitolwatch_ingest::foundation::{FoundationCoordinator, FoundationEndpoint};
use capitolwatch_ingest::store::EntityStore;
use capitolwatch_ingest::testing::{
    test_deps, test_deps_with_store, FlakyStore, MockConnector, UpstreamConnector,
};
use capitolwatch_ingest::IngestDeps;

async fn coordinator(
    bills: MockConnector,
    people: MockConnector,
) -> (FoundationCoordinator, IngestDeps) {
    let deps = test_deps();
    for (id, name) in [("openstates-bills", "Bills"), ("openstates-people", "Legislators")] {
        deps.registry
            .register(SourceDescriptor::new(id, name, Layer::Foundation))
            .await;
    }
    let endpoints = vec![
        FoundationEndpoint {
            source_id: "openstates-bills".into(),
            kind: EntityKind::Bill,
            connector: Arc::new(bills),
        },
        FoundationEndpoint {
            source_id: "openstates-people".into(),
            kind: EntityKind::Legislator,
            connector: Arc::new(people),
        },
    ];
    let coordinator =
        FoundationCoordinator::new(deps.clone(), endpoints, Duration::from_secs(1800));
    (coordinator, deps)
}

fn legislators() -> Vec<serde_json::Value> {
    vec![
        json!({
            "name": "Jane Doe",
            "party": "Democratic",
            "current_role": {"org_classification": "upper", "district": "12"},
            "jurisdiction": {"id": "ocd-jurisdiction/country:us/state:co/government"},
        }),
        json!({
            "name": "John Roe",
            "party": "Republican",
            "current_role": {"org_classification": "lower", "district": 40},
        }),
    ]
}

#[tokio::test(start_paused = true)]
async fn timed_out_endpoint_does_not_sink_the_tick() {
    let bills = MockConnector::new("openstates-bills").with_delay(Duration::from_secs(600));
    let people = MockConnector::new("openstates-people").then_ok(legislators());
    let (coordinator, deps) = coordinator(bills, people).await;

    let report = coordinator.tick(JobTrigger::Schedule).await;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.jobs.len(), 2);

    let bills_job = report
        .jobs
        .iter()
        .find(|j| j.source_id == "openstates-bills")
        .unwrap();
    assert_eq!(bills_job.status, JobStatus::Failed);
    assert!(bills_job.errors[0].contains("timed out"));
    assert_eq!(bills_job.counts.records_added, 0);

    let people_job = report
        .jobs
        .iter()
        .find(|j| j.source_id == "openstates-people")
        .unwrap();
    assert_eq!(people_job.status, JobStatus::Completed);
    assert_eq!(people_job.counts.records_added, 2);

    let bills_source = deps.registry.get("openstates-bills").await.unwrap();
    assert_eq!(bills_source.consecutive_errors, 1);
    let people_source = deps.registry.get("openstates-people").await.unwrap();
    assert_eq!(people_source.consecutive_errors, 0);
    assert!(people_source.last_run.is_some());

    let logged = deps.jobs.recent(10).await;
    assert_eq!(logged.len(), 2);
    assert_eq!(deps.jobs.running_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn every_endpoint_failing_fails_the_tick() {
    let bills = MockConnector::new("openstates-bills")
        .then_err(ConnectorError::Unauthorized("401".into()));
    let people = MockConnector::new("openstates-people")
        .then_err(ConnectorError::MalformedResponse("not json".into()));
    let (coordinator, _) = coordinator(bills, people).await;

    let report = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.jobs.iter().all(|j| j.status == JobStatus::Failed));
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_move_source_to_error_and_success_recovers() {
    let bills = MockConnector::new("openstates-bills")
        .then_err(ConnectorError::Unauthorized("401".into()))
        .then_err(ConnectorError::Unauthorized("401".into()))
        .then_err(ConnectorError::Unauthorized("401".into()))
        .then_ok(vec![json!({"session": "2025", "identifier": "HB25-1001", "title": "A"})]);
    let (coordinator, deps) = coordinator(bills, MockConnector::new("openstates-people")).await;

    for _ in 0..3 {
        coordinator.tick(JobTrigger::Schedule).await;
    }
    let source = deps.registry.get("openstates-bills").await.unwrap();
    assert_eq!(source.status, SourceStatus::Error);
    assert_eq!(source.consecutive_errors, 3);

    // Sources in error keep being attempted.
    coordinator.tick(JobTrigger::Schedule).await;
    let source = deps.registry.get("openstates-bills").await.unwrap();
    assert_eq!(source.status, SourceStatus::Active);
    assert_eq!(source.consecutive_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn retryable_error_is_counted_once_per_run() {
    let bills = MockConnector::new("openstates-bills")
        .then_err(ConnectorError::Unavailable("502".into()))
        .then_err(ConnectorError::Unavailable("502".into()))
        .then_err(ConnectorError::Unavailable("502".into()));
    let (coordinator, deps) = coordinator(bills, MockConnector::new("openstates-people")).await;

    let report = coordinator.tick(JobTrigger::Schedule).await;
    let bills_job = report
        .jobs
        .iter()
        .find(|j| j.source_id == "openstates-bills")
        .unwrap();
    assert_eq!(bills_job.status, JobStatus::Failed);
    assert_eq!(bills_job.errors.len(), 1);
    assert_eq!(
        deps.registry
            .get("openstates-bills")
            .await
            .unwrap()
            .consecutive_errors,
        1
    );
}

async fn bills_only(
    store: Arc<dyn EntityStore>,
    connector: Arc<dyn SourceConnector>,
) -> (FoundationCoordinator, IngestDeps) {
    let deps = test_deps_with_store(store);
    deps.registry
        .register(SourceDescriptor::new("openstates-bills", "Bills", Layer::Foundation))
        .await;
    let endpoint = FoundationEndpoint {
        source_id: "openstates-bills".into(),
        kind: EntityKind::Bill,
        connector,
    };
    let coordinator =
        FoundationCoordinator::new(deps.clone(), vec![endpoint], Duration::from_secs(1800));
    (coordinator, deps)
}

fn upstream_bill(identifier: &str, hours_ago: i64) -> Value {
    let updated_at = Utc::now() - ChronoDuration::hours(hours_ago);
    json!({
        "session": "2025",
        "identifier": identifier,
        "title": format!("Bill {identifier}"),
        "updated_at": updated_at.to_rfc3339(),
    })
}

#[tokio::test]
async fn record_that_failed_to_write_is_synced_on_the_next_tick() {
    let store = Arc::new(
        FlakyStore::new().failing_on(NaturalKey::bill("co", "2025", "HB25-1001")),
    );
    let upstream = Arc::new(
        UpstreamConnector::new("openstates-bills", "updated_at")
            .with_records(vec![upstream_bill("HB25-1001", 1)]),
    );
    let (coordinator, _) = bills_only(store.clone(), upstream.clone()).await;

    let first = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(first.counts.errors, 1);
    assert_eq!(first.jobs[0].metadata["cursor_held"], true);

    store.heal();
    let second = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(second.jobs[0].metadata["mode"], "full");
    assert_eq!(second.counts.records_added, 1);
    assert_eq!(store.inner().entity_count().await, 1);

    // Clean sync: the cursor moves and the old record is no longer re-fetched.
    let third = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(third.jobs[0].metadata["mode"], "delta");
    assert_eq!(third.counts.records_seen, 0);
}

#[tokio::test]
async fn delta_picks_up_records_changed_after_the_cursor() {
    let upstream = Arc::new(
        UpstreamConnector::new("openstates-bills", "updated_at")
            .with_records(vec![upstream_bill("HB25-1001", 2)]),
    );
    let store = Arc::new(FlakyStore::new());
    let (coordinator, _) = bills_only(store.clone(), upstream.clone()).await;

    coordinator.tick(JobTrigger::Schedule).await;
    upstream.push(json!({
        "session": "2025",
        "identifier": "HB25-1002",
        "title": "Late arrival",
        "updated_at": (Utc::now() + ChronoDuration::seconds(5)).to_rfc3339(),
    }));

    let delta = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(delta.jobs[0].metadata["mode"], "delta");
    assert_eq!(delta.counts.records_seen, 1);
    assert_eq!(delta.counts.records_added, 1);
    assert_eq!(store.inner().entity_count().await, 2);
}

#[tokio::test]
async fn truncated_batch_holds_the_cursor() {
    let upstream = Arc::new(
        UpstreamConnector::new("openstates-bills", "updated_at")
            .with_records(vec![
                upstream_bill("HB25-1001", 3),
                upstream_bill("HB25-1002", 2),
                upstream_bill("HB25-1003", 1),
            ])
            .with_limit(2),
    );
    let (coordinator, _) = bills_only(Arc::new(FlakyStore::new()), upstream).await;

    let first = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(first.jobs[0].metadata["truncated"], true);
    assert_eq!(first.jobs[0].metadata["cursor_held"], true);
    assert_eq!(first.counts.records_added, 2);

    let second = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(second.jobs[0].metadata["mode"], "full");
}

#[tokio::test]
async fn endpoints_without_a_delta_filter_always_run_full() {
    let upstream = Arc::new(
        UpstreamConnector::new("openstates-bills", "updated_at")
            .with_records(vec![upstream_bill("HB25-1001", 1)])
            .without_since(),
    );
    let (coordinator, _) = bills_only(Arc::new(FlakyStore::new()), upstream).await;

    coordinator.tick(JobTrigger::Schedule).await;
    let second = coordinator.tick(JobTrigger::Schedule).await;
    assert_eq!(second.jobs[0].metadata["mode"], "full");
    assert_eq!(second.counts.records_unchanged, 1);
}
