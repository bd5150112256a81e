// Test mocks for the ingestion core.
//
// One mock per trait boundary:
// - MockConnector (SourceConnector): scripted fetch results
// - UpstreamConnector (SourceConnector): in-memory upstream honouring `since`
// - MockProvider (AnalysisProvider): scripted completions
// - FlakyStore (EntityStore): MemoryStore that fails chosen keys
//
// Plus builders for entities, artifacts and raw records, and a deps bundle
// wired to in-memory stores.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use capitolwatch_common::{
    normalize_bill_identifier, AnalysisArtifact, AnalysisError, AnalysisResult,
    AnalysisSourceType, ArtifactQuality, Bill, CanonicalEntity, ConnectorError, EntityKind,
    Legislator, NaturalKey, Party, Signal, SourceDescriptor, StoreError,
};

use crate::checkpoint::MemoryCheckpointStore;
use crate::connectors::{FetchBatch, RawRecord, SourceConnector};
use crate::deps::IngestDeps;
use crate::intelligence::{AnalysisProvider, ProviderResponse};
use crate::retry::RetryPolicy;
use crate::store::{EntityStore, MemoryStore};

// ---------------------------------------------------------------------------
// MockConnector
// ---------------------------------------------------------------------------

/// Connector that replays scripted results in order, then returns empty
/// batches. Builder pattern: `.then_ok()`, `.then_err()`, `.with_delay()`.
pub struct MockConnector {
    id: String,
    script: Mutex<VecDeque<Result<Vec<Value>, ConnectorError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockConnector {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then_ok(self, payloads: Vec<Value>) -> Self {
        self.script.lock().unwrap().push_back(Ok(payloads));
        self
    }

    pub fn then_err(self, err: ConnectorError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    /// Every call sleeps this long first. Pair with a paused clock.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for MockConnector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(
        &self,
        source: &SourceDescriptor,
        _since: Option<DateTime<Utc>>,
    ) -> Result<FetchBatch, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(payloads)) => Ok(FetchBatch::new(
                payloads
                    .into_iter()
                    .map(|p| RawRecord::new(source.id.as_str(), p))
                    .collect(),
            )),
            Some(Err(err)) => Err(err),
            None => Ok(FetchBatch::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// UpstreamConnector
// ---------------------------------------------------------------------------

/// Connector over a mutable in-memory upstream that honours `since` like a
/// real API: only records whose timestamp field is strictly newer come back,
/// newest first, capped at `limit` records with the batch marked truncated.
pub struct UpstreamConnector {
    id: String,
    timestamp_field: String,
    records: Mutex<Vec<Value>>,
    limit: Option<usize>,
    honours_since: bool,
    calls: AtomicUsize,
}

impl UpstreamConnector {
    /// `timestamp_field` is the RFC 3339 field `since` is compared against,
    /// e.g. `updated_at` for bills or `created_at` for posts.
    pub fn new(id: &str, timestamp_field: &str) -> Self {
        Self {
            id: id.to_string(),
            timestamp_field: timestamp_field.to_string(),
            records: Mutex::new(Vec::new()),
            limit: None,
            honours_since: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_records(self, records: Vec<Value>) -> Self {
        self.records.lock().unwrap().extend(records);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Behave like a list endpoint with no delta filter.
    pub fn without_since(mut self) -> Self {
        self.honours_since = false;
        self
    }

    /// Add a record upstream between fetches.
    pub fn push(&self, record: Value) {
        self.records.lock().unwrap().push(record);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn timestamp(&self, record: &Value) -> Option<DateTime<Utc>> {
        record
            .get(&self.timestamp_field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

#[async_trait]
impl SourceConnector for UpstreamConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_since(&self) -> bool {
        self.honours_since
    }

    async fn fetch(
        &self,
        source: &SourceDescriptor,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchBatch, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let since = since.filter(|_| self.honours_since);
        let mut matching: Vec<(Option<DateTime<Utc>>, Value)> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| (self.timestamp(r), r.clone()))
            .filter(|(ts, _)| match (since, ts) {
                (Some(since), Some(ts)) => *ts > since,
                _ => true,
            })
            .collect();
        matching.sort_by(|a, b| b.0.cmp(&a.0));

        let truncated = self.limit.is_some_and(|limit| matching.len() > limit);
        if let Some(limit) = self.limit {
            matching.truncate(limit);
        }
        Ok(FetchBatch {
            records: matching
                .into_iter()
                .map(|(_, payload)| RawRecord::new(source.id.as_str(), payload))
                .collect(),
            pages_fetched: 1,
            truncated,
        })
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Analysis provider that replays scripted responses. Once the script runs
/// out every call answers with a minimal well-formed result.
pub struct MockProvider {
    model: String,
    script: Mutex<VecDeque<Result<ProviderResponse, AnalysisError>>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then_text(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(ProviderResponse {
            text: text.to_string(),
            input_tokens: 100,
            output_tokens: 50,
        }));
        self
    }

    pub fn then_err(self, err: AnalysisError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisProvider for MockProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        _system: &str,
        _prompt: &str,
    ) -> Result<ProviderResponse, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(ProviderResponse {
                text: r#"{"summary": "Mock analysis.", "sentiment": "neutral", "confidence": 0.5}"#
                    .to_string(),
                input_tokens: 100,
                output_tokens: 50,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

/// MemoryStore whose upserts fail for chosen natural keys, and whose signal
/// inserts can be made to fail after a number of successes.
pub struct FlakyStore {
    inner: MemoryStore,
    failing_keys: Mutex<HashSet<NaturalKey>>,
    signal_budget: Mutex<Option<usize>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_keys: Mutex::new(HashSet::new()),
            signal_budget: Mutex::new(None),
        }
    }

    pub fn failing_on(self, key: NaturalKey) -> Self {
        self.failing_keys.lock().unwrap().insert(key);
        self
    }

    /// Stop injecting failures; later writes go through.
    pub fn heal(&self) {
        self.failing_keys.lock().unwrap().clear();
        *self.signal_budget.lock().unwrap() = None;
    }

    /// Allow `n` signal inserts, then fail every one after.
    pub fn signals_fail_after(self, n: usize) -> Self {
        *self.signal_budget.lock().unwrap() = Some(n);
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn find_by_natural_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<CanonicalEntity>, StoreError> {
        self.inner.find_by_natural_key(key).await
    }

    async fn upsert(&self, entity: CanonicalEntity) -> Result<CanonicalEntity, StoreError> {
        let key = entity.natural_key();
        if self.failing_keys.lock().unwrap().contains(&key) {
            return Err(StoreError::Unreachable(format!("injected failure for {key}")));
        }
        self.inner.upsert(entity).await
    }

    async fn touch_synced(
        &self,
        key: &NaturalKey,
        source_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.touch_synced(key, source_id, at).await
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<CanonicalEntity>, StoreError> {
        self.inner.list_all(kind).await
    }

    async fn insert_signal(&self, signal: Signal) -> Result<(), StoreError> {
        {
            let mut budget = self.signal_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(StoreError::Unreachable("injected signal failure".into()));
                }
                *remaining -= 1;
            }
        }
        self.inner.insert_signal(signal).await
    }

    async fn insert_artifact(&self, artifact: AnalysisArtifact) -> Result<(), StoreError> {
        self.inner.insert_artifact(artifact).await
    }

    async fn latest_artifact(
        &self,
        source_type: AnalysisSourceType,
        source_id: &str,
    ) -> Result<Option<AnalysisArtifact>, StoreError> {
        self.inner.latest_artifact(source_type, source_id).await
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Colorado 2025 bill with the given identifier and title.
pub fn bill_entity(identifier: &str, title: &str, updated_at: DateTime<Utc>) -> CanonicalEntity {
    CanonicalEntity::Bill(Bill {
        jurisdiction: "co".to_string(),
        session: "2025".to_string(),
        identifier: normalize_bill_identifier(identifier),
        title: title.to_string(),
        chamber: None,
        classification: vec!["bill".to_string()],
        subjects: Vec::new(),
        sponsors: Vec::new(),
        latest_action: None,
        latest_action_date: None,
        documents: Vec::new(),
        versions: Vec::new(),
        source_url: None,
        updated_at,
        last_synced_at: BTreeMap::new(),
    })
}

pub fn legislator_entity(name: &str, district: &str) -> CanonicalEntity {
    CanonicalEntity::Legislator(Legislator {
        jurisdiction: "co".to_string(),
        name: name.to_string(),
        district: district.to_string(),
        party: Party::Democratic,
        chamber: None,
        email: None,
        active: true,
        updated_at: Utc::now(),
        last_synced_at: BTreeMap::new(),
    })
}

/// Complete artifact with the given summary and default everything else.
pub fn artifact(source_type: AnalysisSourceType, source_id: &str, summary: &str) -> AnalysisArtifact {
    AnalysisArtifact {
        id: Uuid::new_v4(),
        source_type,
        source_id: source_id.to_string(),
        analysis_type: source_type.analysis_type(),
        result: AnalysisResult {
            summary: summary.to_string(),
            ..AnalysisResult::default()
        },
        quality: ArtifactQuality::Complete,
        model: "mock-model".to_string(),
        cost_estimate_usd: 0.0,
        change_summary: None,
        created_at: Utc::now(),
    }
}

pub fn raw_record(source_id: &str, payload: Value) -> RawRecord {
    RawRecord::new(source_id, payload)
}

/// Retries without real waiting.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    }
}

pub fn test_deps() -> IngestDeps {
    test_deps_with_store(Arc::new(MemoryStore::new()))
}

pub fn test_deps_with_store(store: Arc<dyn EntityStore>) -> IngestDeps {
    IngestDeps::builder()
        .store(store)
        .checkpoints(Arc::new(MemoryCheckpointStore::new()))
        .retry(fast_retry())
        .build()
}
