// Entity reconciler: raw records -> canonical entities -> upsert plan.
//
// Mapping and planning are pure. Only `lookup_existing` and `apply` touch the
// store, so the insert/update/unchanged decisions can be tested against a
// plain HashMap.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use capitolwatch_common::{
    normalize_bill_identifier, normalize_jurisdiction, Bill, CanonicalEntity, Chamber, Committee,
    DocumentLink, EntityKind, FieldChange, JobCounts, Legislator, NaturalKey, Party,
    ReconciliationError, StoreError,
};

use crate::connectors::RawRecord;
use crate::store::EntityStore;

/// Defaults applied when a record omits them.
#[derive(Debug, Clone)]
pub struct MappingContext {
    pub default_jurisdiction: String,
    /// Used as `updated_at` when the upstream record carries none.
    pub now: DateTime<Utc>,
}

impl MappingContext {
    pub fn new(default_jurisdiction: impl Into<String>) -> Self {
        Self {
            default_jurisdiction: default_jurisdiction.into(),
            now: Utc::now(),
        }
    }
}

/// Why one record of a batch was skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub record_index: usize,
    pub error: RecordError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    Insert,
    Update { changes: Vec<FieldChange> },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub record_index: usize,
    pub key: NaturalKey,
    pub entity: CanonicalEntity,
    pub action: PlanAction,
}

/// The reconciler's output: one decision per surviving natural key, plus the
/// records that could not be mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertPlan {
    pub kind: EntityKind,
    pub records_seen: usize,
    pub entries: Vec<PlanEntry>,
    pub failures: Vec<RecordFailure>,
    /// Earlier records replaced by a later record with the same key.
    pub superseded: usize,
}

impl UpsertPlan {
    pub fn inserts(&self) -> usize {
        self.count(|a| matches!(a, PlanAction::Insert))
    }

    pub fn updates(&self) -> usize {
        self.count(|a| matches!(a, PlanAction::Update { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|a| matches!(a, PlanAction::Unchanged))
    }

    fn count(&self, f: impl Fn(&PlanAction) -> bool) -> usize {
        self.entries.iter().filter(|e| f(&e.action)).count()
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Read access to existing canonical entities while planning.
pub trait EntityLookup {
    fn lookup(&self, key: &NaturalKey) -> Result<Option<CanonicalEntity>, StoreError>;
}

impl EntityLookup for HashMap<NaturalKey, CanonicalEntity> {
    fn lookup(&self, key: &NaturalKey) -> Result<Option<CanonicalEntity>, StoreError> {
        Ok(self.get(key).cloned())
    }
}

/// Store rows fetched ahead of planning. Keys whose lookup failed keep the error.
#[derive(Debug, Default)]
pub struct Prefetched {
    found: HashMap<NaturalKey, CanonicalEntity>,
    failed: HashMap<NaturalKey, StoreError>,
}

impl EntityLookup for Prefetched {
    fn lookup(&self, key: &NaturalKey) -> Result<Option<CanonicalEntity>, StoreError> {
        if let Some(err) = self.failed.get(key) {
            return Err(err.clone());
        }
        Ok(self.found.get(key).cloned())
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Records mapped to canonical form, deduplicated last-write-within-batch.
#[derive(Debug, Clone)]
pub struct MappedBatch {
    kind: EntityKind,
    records_seen: usize,
    entries: Vec<(usize, NaturalKey, CanonicalEntity)>,
    failures: Vec<RecordFailure>,
    superseded: usize,
}

impl MappedBatch {
    pub fn keys(&self) -> impl Iterator<Item = &NaturalKey> {
        self.entries.iter().map(|(_, key, _)| key)
    }

    /// Decide insert/update/unchanged for every surviving entry.
    pub fn plan(self, existing: &dyn EntityLookup) -> UpsertPlan {
        let mut failures = self.failures;
        let mut entries = Vec::with_capacity(self.entries.len());

        for (record_index, key, entity) in self.entries {
            let action = match existing.lookup(&key) {
                Ok(None) => PlanAction::Insert,
                Ok(Some(current)) => {
                    let changes = current.diff(&entity);
                    if changes.is_empty() {
                        PlanAction::Unchanged
                    } else {
                        PlanAction::Update { changes }
                    }
                }
                Err(err) => {
                    failures.push(RecordFailure {
                        record_index,
                        error: err.into(),
                    });
                    continue;
                }
            };
            entries.push(PlanEntry {
                record_index,
                key,
                entity,
                action,
            });
        }
        failures.sort_by_key(|f| f.record_index);

        UpsertPlan {
            kind: self.kind,
            records_seen: self.records_seen,
            entries,
            failures,
            superseded: self.superseded,
        }
    }
}

/// Map every record; failures are kept per record and never abort the batch.
pub fn map_batch(records: &[RawRecord], kind: EntityKind, ctx: &MappingContext) -> MappedBatch {
    let mut slots: Vec<Option<(usize, NaturalKey, CanonicalEntity)>> = Vec::new();
    let mut by_key: HashMap<NaturalKey, usize> = HashMap::new();
    let mut failures = Vec::new();
    let mut superseded = 0;

    for (index, record) in records.iter().enumerate() {
        match map_record(&record.payload, kind, ctx) {
            Ok(entity) => {
                let key = entity.natural_key();
                if let Some(previous) = by_key.insert(key.clone(), slots.len()) {
                    slots[previous] = None;
                    superseded += 1;
                }
                slots.push(Some((index, key, entity)));
            }
            Err(err) => {
                debug!(record = index, kind = %kind, error = %err, "Record failed mapping");
                failures.push(RecordFailure {
                    record_index: index,
                    error: err.into(),
                });
            }
        }
    }

    MappedBatch {
        kind,
        records_seen: records.len(),
        entries: slots.into_iter().flatten().collect(),
        failures,
        superseded,
    }
}

/// Map and plan in one step against an in-memory view of the store.
pub fn reconcile(
    records: &[RawRecord],
    kind: EntityKind,
    ctx: &MappingContext,
    existing: &dyn EntityLookup,
) -> UpsertPlan {
    map_batch(records, kind, ctx).plan(existing)
}

/// Fetch the stored rows for every key in the batch.
pub async fn lookup_existing(store: &dyn EntityStore, batch: &MappedBatch) -> Prefetched {
    let mut prefetched = Prefetched::default();
    for key in batch.keys() {
        match store.find_by_natural_key(key).await {
            Ok(Some(entity)) => {
                prefetched.found.insert(key.clone(), entity);
            }
            Ok(None) => {}
            Err(err) => {
                prefetched.failed.insert(key.clone(), err);
            }
        }
    }
    prefetched
}

// ---------------------------------------------------------------------------
// Applying
// ---------------------------------------------------------------------------

/// Result of writing a plan.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub counts: JobCounts,
    pub errors: Vec<String>,
    /// Entities written as inserts, as stored.
    pub inserted: Vec<CanonicalEntity>,
    /// Entities written as updates, as stored, with the fields that changed.
    pub updated: Vec<(CanonicalEntity, Vec<FieldChange>)>,
}

/// Write inserts and updates, and stamp unchanged rows with this sync's time.
/// A failed write skips that record only.
///
/// Counts satisfy `seen == added + updated + unchanged + errors`; records
/// superseded within the batch count as unchanged.
pub async fn apply(
    store: &dyn EntityStore,
    plan: &UpsertPlan,
    source_id: &str,
    now: DateTime<Utc>,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    report.counts.records_seen = plan.records_seen as u64;
    report.counts.records_unchanged = plan.superseded as u64;

    for failure in &plan.failures {
        report.counts.errors += 1;
        report
            .errors
            .push(format!("record {}: {}", failure.record_index, failure.error));
    }

    for entry in &plan.entries {
        if entry.action == PlanAction::Unchanged {
            report.counts.records_unchanged += 1;
            if let Err(err) = store.touch_synced(&entry.key, source_id, now).await {
                warn!(
                    source = source_id,
                    key = %entry.key,
                    error = %err,
                    "Could not record sync time for unchanged record"
                );
            }
            continue;
        }

        let mut entity = entry.entity.clone();
        entity.mark_synced(source_id, now);
        match store.upsert(entity).await {
            Ok(stored) => match &entry.action {
                PlanAction::Update { changes } => {
                    report.counts.records_updated += 1;
                    report.updated.push((stored, changes.clone()));
                }
                _ => {
                    report.counts.records_added += 1;
                    report.inserted.push(stored);
                }
            },
            Err(err) => {
                warn!(
                    source = source_id,
                    key = %entry.key,
                    error = %err,
                    "Upsert failed, skipping record"
                );
                report.counts.errors += 1;
                report
                    .errors
                    .push(format!("record {}: {}", entry.record_index, err));
            }
        }
    }

    report
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// Turn one source-native record into its canonical shape.
///
/// Accepts both Open States v3 records and flat records
/// (`{jurisdiction, session, identifier, title, ...}`).
pub fn map_record(
    raw: &Value,
    kind: EntityKind,
    ctx: &MappingContext,
) -> Result<CanonicalEntity, ReconciliationError> {
    if !raw.is_object() {
        return Err(ReconciliationError::mapping("record", "expected a JSON object"));
    }
    let entity = match kind {
        EntityKind::Bill => CanonicalEntity::Bill(map_bill(raw, ctx)?),
        EntityKind::Legislator => CanonicalEntity::Legislator(map_legislator(raw, ctx)?),
        EntityKind::Committee => CanonicalEntity::Committee(map_committee(raw, ctx)?),
    };
    let key = entity.natural_key();
    if !key.is_complete() {
        return Err(ReconciliationError::AmbiguousKey(key.to_string()));
    }
    Ok(entity)
}

fn map_bill(raw: &Value, ctx: &MappingContext) -> Result<Bill, ReconciliationError> {
    let chamber = match raw.get("chamber") {
        Some(v) if !v.is_null() => parse_chamber(v)?,
        _ => match raw.pointer("/from_organization/classification") {
            Some(v) => parse_chamber(v)?,
            None => None,
        },
    };

    Ok(Bill {
        jurisdiction: jurisdiction(raw, ctx),
        session: required_str(raw, "session")?,
        identifier: normalize_bill_identifier(&required_str(raw, "identifier")?),
        title: required_str(raw, "title")?,
        chamber,
        classification: string_list(raw.get("classification")),
        subjects: string_list(raw.get("subject").or_else(|| raw.get("subjects"))),
        sponsors: names(raw.get("sponsorships").or_else(|| raw.get("sponsors"))),
        latest_action: first_str(raw, &["latest_action_description", "latest_action"]),
        latest_action_date: first_str(raw, &["latest_action_date"]),
        documents: document_links(raw.get("documents")),
        versions: document_links(raw.get("versions")),
        source_url: first_str(raw, &["openstates_url", "source_url", "url"])
            .or_else(|| raw.pointer("/sources/0/url").and_then(Value::as_str).map(str::to_string)),
        updated_at: updated_at(raw, ctx)?,
        last_synced_at: Default::default(),
    })
}

fn map_legislator(raw: &Value, ctx: &MappingContext) -> Result<Legislator, ReconciliationError> {
    let role = raw.get("current_role");
    let chamber_raw = role
        .and_then(|r| r.get("org_classification"))
        .or_else(|| raw.get("chamber"));
    let chamber = match chamber_raw {
        Some(v) => parse_chamber(v)?,
        None => None,
    };
    let district = role
        .and_then(|r| r.get("district"))
        .or_else(|| raw.get("district"))
        .and_then(scalar_string)
        .unwrap_or_default();

    Ok(Legislator {
        jurisdiction: jurisdiction(raw, ctx),
        name: required_str(raw, "name")?,
        district,
        party: raw
            .get("party")
            .and_then(Value::as_str)
            .map(parse_party)
            .unwrap_or(Party::Unaffiliated),
        chamber,
        email: first_str(raw, &["email"]),
        active: raw.get("active").and_then(Value::as_bool).unwrap_or(true),
        updated_at: updated_at(raw, ctx)?,
        last_synced_at: Default::default(),
    })
}

fn map_committee(raw: &Value, ctx: &MappingContext) -> Result<Committee, ReconciliationError> {
    let chamber = match raw.get("chamber") {
        Some(v) if !v.is_null() => parse_chamber(v)?,
        _ => None,
    };
    let mut members = names(raw.get("memberships").or_else(|| raw.get("members")));
    members.sort();
    members.dedup();

    Ok(Committee {
        jurisdiction: jurisdiction(raw, ctx),
        name: required_str(raw, "name")?,
        chamber,
        classification: first_str(raw, &["classification"]),
        members,
        updated_at: updated_at(raw, ctx)?,
        last_synced_at: Default::default(),
    })
}

/// String or `{ "id": ... }` object; the configured default when absent.
fn jurisdiction(raw: &Value, ctx: &MappingContext) -> String {
    let value = match raw.get("jurisdiction") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj
            .get("id")
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    normalize_jurisdiction(&value.unwrap_or_else(|| ctx.default_jurisdiction.clone()))
}

fn required_str(raw: &Value, field: &str) -> Result<String, ReconciliationError> {
    match raw.get(field) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Err(ReconciliationError::mapping(field, "missing")),
        Some(_) => Err(ReconciliationError::mapping(field, "expected a string")),
    }
}

fn first_str(raw: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| raw.get(*f).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Names from `["Jane Doe"]`, `[{"name": ...}]` or `[{"person_name": ...}]`.
fn names(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("name")
                .or_else(|| obj.get("person_name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

/// `[{note, url}]` or Open States' `[{note, links: [{url}]}]`.
fn document_links(value: Option<&Value>) -> Vec<DocumentLink> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let url = item
                .get("url")
                .or_else(|| item.pointer("/links/0/url"))
                .and_then(Value::as_str)?;
            Some(DocumentLink {
                note: item
                    .get("note")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

fn updated_at(raw: &Value, ctx: &MappingContext) -> Result<DateTime<Utc>, ReconciliationError> {
    match raw.get("updated_at").and_then(Value::as_str) {
        Some(s) => parse_timestamp(s)
            .ok_or_else(|| ReconciliationError::mapping("updated_at", format!("bad timestamp `{s}`"))),
        None => Ok(ctx.now),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Open States emits naive timestamps like `2025-02-01T18:04:11.123456`.
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_chamber(value: &Value) -> Result<Option<Chamber>, ReconciliationError> {
    let Some(raw) = value.as_str() else {
        return Err(ReconciliationError::mapping("chamber", "expected a string"));
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "upper" | "senate" => Ok(Some(Chamber::Upper)),
        "lower" | "house" | "assembly" => Ok(Some(Chamber::Lower)),
        "legislature" | "joint" | "unicameral" => Ok(Some(Chamber::Legislature)),
        other => Err(ReconciliationError::mapping(
            "chamber",
            format!("unknown chamber `{other}`"),
        )),
    }
}

fn parse_party(raw: &str) -> Party {
    match raw.trim().to_ascii_lowercase().as_str() {
        "democratic" | "democrat" | "dem" | "d" => Party::Democratic,
        "republican" | "rep" | "gop" | "r" => Party::Republican,
        "independent" | "i" => Party::Independent,
        "libertarian" | "l" => Party::Libertarian,
        "green" | "g" => Party::Green,
        "" | "unaffiliated" | "nonpartisan" => Party::Unaffiliated,
        _ => Party::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> MappingContext {
        MappingContext::new("co")
    }

    fn empty() -> HashMap<NaturalKey, CanonicalEntity> {
        HashMap::new()
    }

    fn raw(payload: Value) -> RawRecord {
        RawRecord::new("openstates-bills", payload)
    }

    #[test]
    fn maps_openstates_bill_shape() {
        let record = json!({
            "id": "ocd-bill/123",
            "session": "2025A",
            "jurisdiction": {"id": "ocd-jurisdiction/country:us/state:co/government", "name": "Colorado"},
            "from_organization": {"classification": "lower"},
            "identifier": "HB25-1001",
            "title": "Concerning Transit",
            "classification": ["bill"],
            "subject": ["Transportation"],
            "sponsorships": [{"name": "Jane Doe", "primary": true}],
            "documents": [{"note": "Fiscal Note", "links": [{"url": "https://leg.example/fn.pdf"}]}],
            "latest_action_description": "Introduced",
            "updated_at": "2025-02-01T18:04:11.123456",
        });
        let entity = map_record(&record, EntityKind::Bill, &ctx()).unwrap();
        let CanonicalEntity::Bill(bill) = entity else {
            panic!("expected bill");
        };
        assert_eq!(bill.jurisdiction, "co");
        assert_eq!(bill.chamber, Some(Chamber::Lower));
        assert_eq!(bill.sponsors, vec!["Jane Doe"]);
        assert_eq!(bill.fiscal_notes().count(), 1);
        assert_eq!(bill.latest_action.as_deref(), Some("Introduced"));
    }

    #[test]
    fn maps_person_vocabularies() {
        let record = json!({
            "name": "John Roe",
            "party": "Republican",
            "current_role": {"org_classification": "upper", "district": 12},
            "jurisdiction": "CO",
        });
        let CanonicalEntity::Legislator(l) =
            map_record(&record, EntityKind::Legislator, &ctx()).unwrap()
        else {
            panic!("expected legislator");
        };
        assert_eq!(l.party, Party::Republican);
        assert_eq!(l.chamber, Some(Chamber::Upper));
        assert_eq!(l.district, "12");
    }

    #[test]
    fn missing_district_is_ambiguous() {
        let record = json!({"name": "John Roe", "party": "R"});
        let err = map_record(&record, EntityKind::Legislator, &ctx()).unwrap_err();
        assert!(matches!(err, ReconciliationError::AmbiguousKey(_)));
    }

    #[test]
    fn unknown_chamber_is_mapping_failure() {
        let record = json!({"session": "2025", "identifier": "HB1", "title": "T", "chamber": "moon"});
        let err = map_record(&record, EntityKind::Bill, &ctx()).unwrap_err();
        assert_eq!(
            err,
            ReconciliationError::mapping("chamber", "unknown chamber `moon`")
        );
    }

    #[test]
    fn insert_update_unchanged_sequence() {
        let mut existing: HashMap<NaturalKey, CanonicalEntity> = HashMap::new();
        let record = |title: &str| {
            raw(json!({"jurisdiction": "CO", "session": "2025", "identifier": "HB25-1001", "title": title}))
        };

        let plan = reconcile(&[record("A")], EntityKind::Bill, &ctx(), &existing);
        assert_eq!(plan.entries[0].action, PlanAction::Insert);
        existing.insert(plan.entries[0].key.clone(), plan.entries[0].entity.clone());

        let plan = reconcile(&[record("B")], EntityKind::Bill, &ctx(), &existing);
        let PlanAction::Update { changes } = &plan.entries[0].action else {
            panic!("expected update, got {:?}", plan.entries[0].action);
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "title");
        assert_eq!(changes[0].before, json!("A"));
        assert_eq!(changes[0].after, json!("B"));
        existing.insert(plan.entries[0].key.clone(), plan.entries[0].entity.clone());

        let plan = reconcile(&[record("B")], EntityKind::Bill, &ctx(), &existing);
        assert_eq!(plan.entries[0].action, PlanAction::Unchanged);
    }

    #[test]
    fn later_record_wins_within_batch() {
        let records = vec![
            raw(json!({"session": "2025", "identifier": "HB25-1001", "title": "first"})),
            raw(json!({"session": "2025", "identifier": "hb25-1001", "title": "second"})),
        ];
        let plan = reconcile(&records, EntityKind::Bill, &ctx(), &empty());
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.superseded, 1);
        assert_eq!(plan.entries[0].record_index, 1);
        let CanonicalEntity::Bill(bill) = &plan.entries[0].entity else {
            panic!("expected bill");
        };
        assert_eq!(bill.title, "second");
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let records = vec![
            raw(json!({"session": "2025", "identifier": "HB25-1001", "title": "ok"})),
            raw(json!({"session": "2025", "identifier": "HB25-1002"})),
            raw(json!("not an object")),
            raw(json!({"session": "2025", "identifier": "HB25-1003", "title": "ok"})),
        ];
        let plan = reconcile(&records, EntityKind::Bill, &ctx(), &empty());
        assert_eq!(plan.inserts(), 2);
        assert_eq!(plan.failures.len(), 2);
        assert_eq!(plan.failures[0].record_index, 1);
        assert_eq!(
            plan.failures[0].error,
            RecordError::Reconciliation(ReconciliationError::mapping("title", "missing"))
        );
    }

    #[test]
    fn lookup_failure_is_a_record_failure() {
        let mut prefetched = Prefetched::default();
        let key = NaturalKey::bill("co", "2025", "HB25-1001");
        prefetched
            .failed
            .insert(key, StoreError::Unreachable("connection reset".into()));

        let records = vec![raw(
            json!({"session": "2025", "identifier": "HB25-1001", "title": "T"}),
        )];
        let plan = reconcile(&records, EntityKind::Bill, &ctx(), &prefetched);
        assert!(plan.entries.is_empty());
        assert_eq!(plan.failures.len(), 1);
        assert!(matches!(plan.failures[0].error, RecordError::Store(_)));
    }

    #[test]
    fn party_vocabulary() {
        assert_eq!(parse_party("Democratic"), Party::Democratic);
        assert_eq!(parse_party("d"), Party::Democratic);
        assert_eq!(parse_party("Unity"), Party::Other);
        assert_eq!(parse_party(""), Party::Unaffiliated);
    }
}
