//! Reconciler against a live in-memory store: map, look up, plan, apply.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use capitolwatch_common::{CanonicalEntity, EntityKind, NaturalKey};
use capitolwatch_ingest::connectors::RawRecord;
use capitolwatch_ingest::reconciler::{
    apply, lookup_existing, map_batch, ApplyReport, MappingContext, PlanAction, UpsertPlan,
};
use capitolwatch_ingest::store::{EntityStore, MemoryStore};
use capitolwatch_ingest::testing::FlakyStore;

const SOURCE: &str = "openstates-bills";

fn records(payloads: Vec<Value>) -> Vec<RawRecord> {
    payloads
        .into_iter()
        .map(|p| RawRecord::new(SOURCE, p))
        .collect()
}

async fn run(store: &dyn EntityStore, payloads: Vec<Value>) -> (UpsertPlan, ApplyReport) {
    let ctx = MappingContext::new("co");
    let mapped = map_batch(&records(payloads), EntityKind::Bill, &ctx);
    let existing = lookup_existing(store, &mapped).await;
    let plan = mapped.plan(&existing);
    let report = apply(store, &plan, SOURCE, Utc::now()).await;
    (plan, report)
}

fn bill(title: &str) -> Value {
    json!({"jurisdiction": "CO", "session": "2025", "identifier": "HB25-1001", "title": title})
}

#[tokio::test]
async fn insert_then_update_then_unchanged() {
    let store = MemoryStore::new();

    let (plan, _) = run(&store, vec![bill("A")]).await;
    assert_eq!(plan.entries[0].action, PlanAction::Insert);

    let (plan, _) = run(&store, vec![bill("B")]).await;
    match &plan.entries[0].action {
        PlanAction::Update { changes } => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].field, "title");
            assert_eq!(changes[0].before, json!("A"));
            assert_eq!(changes[0].after, json!("B"));
        }
        other => panic!("expected update, got {other:?}"),
    }

    let (plan, report) = run(&store, vec![bill("B")]).await;
    assert_eq!(plan.entries[0].action, PlanAction::Unchanged);
    assert_eq!(report.counts.records_unchanged, 1);
}

#[tokio::test]
async fn second_identical_run_is_all_unchanged() {
    let store = MemoryStore::new();
    let batch: Vec<Value> = (1..=20)
        .map(|i| {
            json!({
                "session": "2025",
                "identifier": format!("SB25-{i:03}"),
                "title": format!("Bill {i}"),
                "updated_at": "2025-03-01T12:00:00Z",
            })
        })
        .collect();

    let (first, _) = run(&store, batch.clone()).await;
    assert_eq!(first.inserts(), 20);

    let (second, report) = run(&store, batch).await;
    assert_eq!(second.inserts(), 0);
    assert_eq!(second.updates(), 0);
    assert_eq!(second.unchanged(), 20);
    assert_eq!(report.counts.records_added + report.counts.records_updated, 0);
}

#[tokio::test]
async fn unchanged_sync_still_advances_last_synced_at() {
    let store = MemoryStore::new();
    let ctx = MappingContext::new("co");
    let first_sync = Utc::now();
    let second_sync = first_sync + Duration::minutes(30);

    for at in [first_sync, second_sync] {
        let mapped = map_batch(&records(vec![bill("A")]), EntityKind::Bill, &ctx);
        let existing = lookup_existing(&store, &mapped).await;
        let plan = mapped.plan(&existing);
        let report = apply(&store, &plan, SOURCE, at).await;
        assert_eq!(report.counts.errors, 0);
    }

    let key = NaturalKey::bill("co", "2025", "HB25-1001");
    let stored = store.find_by_natural_key(&key).await.unwrap().unwrap();
    assert_eq!(stored.last_synced_at()[SOURCE], second_sync);
}

#[tokio::test]
async fn spellings_of_one_key_never_make_two_rows() {
    let store = MemoryStore::new();
    let spellings = ["HB25-1001", "hb25-1001", "HB 25-1001", " hb 25-1001 "];
    for (i, identifier) in spellings.iter().enumerate() {
        let payload = json!({
            "jurisdiction": "ocd-jurisdiction/country:us/state:co/government",
            "session": "2025",
            "identifier": identifier,
            "title": format!("Title {i}"),
        });
        run(&store, vec![payload]).await;
    }

    let bills = store.list_all(EntityKind::Bill).await.unwrap();
    assert_eq!(bills.len(), 1);
    match &bills[0] {
        CanonicalEntity::Bill(b) => assert_eq!(b.title, "Title 3"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn later_record_in_batch_wins() {
    let store = MemoryStore::new();
    let (plan, report) = run(&store, vec![bill("first"), bill("second")]).await;

    assert_eq!(plan.entries.len(), 1);
    assert_eq!(plan.superseded, 1);
    assert_eq!(report.counts.records_seen, 2);
    assert_eq!(report.counts.records_added, 1);
    assert_eq!(report.counts.records_unchanged, 1);

    let key = NaturalKey::bill("co", "2025", "HB25-1001");
    match store.find_by_natural_key(&key).await.unwrap().unwrap() {
        CanonicalEntity::Bill(b) => assert_eq!(b.title, "second"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn failures_skip_only_their_records() {
    // 500 records: one unmappable, one with an ambiguous key, one whose
    // write fails. Everything else lands.
    let store = FlakyStore::new().failing_on(NaturalKey::bill("co", "2025", "HB25-1250"));
    let mut batch: Vec<Value> = (0..500)
        .map(|i| {
            json!({
                "session": "2025",
                "identifier": format!("HB25-{:04}", 1000 + i),
                "title": format!("Bill {i}"),
            })
        })
        .collect();
    batch[10] = json!({"session": "2025", "title": "no identifier"});
    batch[20] = json!({"session": "  ", "identifier": "HB25-9999", "title": "blank session"});

    let (plan, report) = run(&store, batch).await;

    assert_eq!(plan.failures.len(), 2);
    assert_eq!(report.counts.records_seen, 500);
    assert_eq!(report.counts.errors, 3);
    assert_eq!(report.counts.records_added + report.counts.records_updated, 497);
    assert_eq!(report.errors.len(), 3);
    assert!(report.errors[0].starts_with("record 10:"));

    let c = report.counts;
    assert_eq!(
        c.records_seen,
        c.records_added + c.records_updated + c.records_unchanged + c.errors
    );
    assert_eq!(store.inner().entity_count().await, 497);
}
