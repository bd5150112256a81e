use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::NaturalKey;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Ingestion cadence a source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Foundation,
    Speed,
    Intelligence,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Foundation, Layer::Speed, Layer::Intelligence];
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foundation => write!(f, "foundation"),
            Self::Speed => write!(f, "speed"),
            Self::Intelligence => write!(f, "intelligence"),
        }
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "foundation" => Ok(Self::Foundation),
            "speed" => Ok(Self::Speed),
            "intelligence" => Ok(Self::Intelligence),
            other => Err(format!("unknown layer `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Paused,
    Error,
    NotYetAvailable,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Error => write!(f, "error"),
            Self::NotYetAvailable => write!(f, "not_yet_available"),
        }
    }
}

/// One ingestible source. Created at startup from configuration, mutated only
/// by the coordinator that owns its layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub layer: Layer,
    pub status: SourceStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    /// Source-specific settings (endpoint, platform kind, feed urls...).
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, layer: Layer) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            layer,
            status: SourceStatus::Active,
            last_run: None,
            next_run: None,
            consecutive_errors: 0,
            config: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Mark a source whose credentials or endpoint are not configured.
    pub fn unavailable(mut self) -> Self {
        self.status = SourceStatus::NotYetAvailable;
        self
    }

    /// Whether the owning coordinator should attempt this source.
    /// Sources in `error` keep being attempted so they can recover.
    pub fn is_runnable(&self) -> bool {
        matches!(self.status, SourceStatus::Active | SourceStatus::Error)
    }

    pub fn record_success(&mut self, now: DateTime<Utc>, next_run: Option<DateTime<Utc>>) {
        self.last_run = Some(now);
        self.next_run = next_run;
        self.consecutive_errors = 0;
        if self.status == SourceStatus::Error {
            self.status = SourceStatus::Active;
        }
    }

    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
        error_threshold: u32,
    ) {
        self.last_run = Some(now);
        self.next_run = next_run;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.status == SourceStatus::Active && self.consecutive_errors >= error_threshold {
            self.status = SourceStatus::Error;
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sync,
    Monitor,
    Analyze,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Monitor => write!(f, "monitor"),
            Self::Analyze => write!(f, "analyze"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What started a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    Schedule,
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub records_seen: u64,
    pub records_added: u64,
    pub records_updated: u64,
    pub records_unchanged: u64,
    pub errors: u64,
}

impl JobCounts {
    pub fn merge(&mut self, other: &JobCounts) {
        self.records_seen += other.records_seen;
        self.records_added += other.records_added;
        self.records_updated += other.records_updated;
        self.records_unchanged += other.records_unchanged;
        self.errors += other.errors;
    }
}

impl fmt::Display for JobCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seen={} added={} updated={} unchanged={} errors={}",
            self.records_seen,
            self.records_added,
            self.records_updated,
            self.records_unchanged,
            self.errors,
        )
    }
}

/// One execution of a sync/monitor/analyze operation against one source.
///
/// Lifecycle: `Scheduled -> Running -> {Completed | Failed}`. Once terminal the
/// job is handed to the job log and only cloned from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub source_id: String,
    pub kind: JobKind,
    pub trigger: JobTrigger,
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: JobCounts,
    pub errors: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl IngestionJob {
    pub fn scheduled(source_id: impl Into<String>, kind: JobKind, trigger: JobTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source_id.into(),
            kind,
            trigger,
            status: JobStatus::Scheduled,
            scheduled_at: Utc::now(),
            started_at: None,
            finished_at: None,
            counts: JobCounts::default(),
            errors: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn start(&mut self) {
        if self.status == JobStatus::Scheduled {
            self.status = JobStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Record a per-record or per-call error. Ignored once terminal.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if !self.status.is_terminal() {
            self.errors.push(message.into());
        }
    }

    pub fn annotate(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        if !self.status.is_terminal() {
            self.metadata.insert(key.to_string(), value.into());
        }
    }

    pub fn complete(self) -> Self {
        self.finish(JobStatus::Completed)
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.record_error(message);
        self.finish(JobStatus::Failed)
    }

    fn finish(mut self, status: JobStatus) -> Self {
        if self.status.is_terminal() {
            return self;
        }
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some((f - s).num_milliseconds()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self::Neutral
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Negative => write!(f, "negative"),
            Self::Neutral => write!(f, "neutral"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// External content (post, article, video) linked to a canonical entity by
/// natural key. Independently timestamped; never mutates the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub platform: String,
    pub external_id: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub excerpt: String,
    pub published_at: DateTime<Utc>,
    pub entity: NaturalKey,
    /// The text that produced the link (bill identifier or legislator name).
    pub matched_text: String,
    pub relevance: f64,
    pub sentiment: Sentiment,
    pub captured_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSourceType {
    Bill,
    BillText,
    FiscalNote,
    Signal,
    Document,
}

impl AnalysisSourceType {
    /// Versioned sources get change detection against their previous artifact.
    pub fn is_versioned(&self) -> bool {
        matches!(self, Self::FiscalNote | Self::BillText)
    }

    pub fn analysis_type(&self) -> AnalysisType {
        match self {
            Self::Bill => AnalysisType::BillSummary,
            Self::BillText => AnalysisType::TextReview,
            Self::FiscalNote => AnalysisType::FiscalImpact,
            Self::Signal => AnalysisType::SignalAssessment,
            Self::Document => AnalysisType::DocumentSummary,
        }
    }
}

impl fmt::Display for AnalysisSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bill => write!(f, "bill"),
            Self::BillText => write!(f, "bill_text"),
            Self::FiscalNote => write!(f, "fiscal_note"),
            Self::Signal => write!(f, "signal"),
            Self::Document => write!(f, "document"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    BillSummary,
    TextReview,
    FiscalImpact,
    SignalAssessment,
    DocumentSummary,
}

/// Structured analysis output, the shape the provider is asked to return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactQuality {
    Complete,
    /// Provider output could not be parsed; the artifact holds a placeholder.
    Pending,
}

/// Immutable AI-derived enrichment of one entity or document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub id: Uuid,
    pub source_type: AnalysisSourceType,
    pub source_id: String,
    pub analysis_type: AnalysisType,
    pub result: AnalysisResult,
    pub quality: ArtifactQuality,
    pub model: String,
    pub cost_estimate_usd: f64,
    pub change_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Unit of work on the intelligence queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub source_type: AnalysisSourceType,
    pub source_id: String,
    pub content: String,
    #[serde(default)]
    pub attempts: u32,
    pub requested_at: DateTime<Utc>,
}

impl AnalysisRequest {
    pub fn new(
        source_type: AnalysisSourceType,
        source_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
            content: content.into(),
            attempts: 0,
            requested_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline status
// ---------------------------------------------------------------------------

/// Qualitative health. Ordered worst to best so `min` picks the worse value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Critical,
    Warning,
    Good,
    Excellent,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
            Self::Good => write!(f, "good"),
            Self::Excellent => write!(f, "excellent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStatus {
    pub layer: Layer,
    pub active_sources: usize,
    pub total_sources: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source_id: String,
    pub name: String,
    pub layer: Layer,
    pub status: SourceStatus,
    pub consecutive_errors: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub recent_jobs: usize,
    pub failed_jobs: usize,
    pub failure_ratio: f64,
    pub health: Health,
}

/// Derived, read-only view over source descriptors and recent jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub generated_at: DateTime<Utc>,
    pub layers: Vec<LayerStatus>,
    pub sources: Vec<SourceHealth>,
    pub health_score: u8,
    pub health: Health,
    pub running_jobs: usize,
    pub analysis_queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_parses_case_insensitively() {
        assert_eq!("Foundation".parse::<Layer>().unwrap(), Layer::Foundation);
        assert_eq!(" speed ".parse::<Layer>().unwrap(), Layer::Speed);
        assert!("batch".parse::<Layer>().is_err());
    }

    #[test]
    fn health_orders_worst_first() {
        assert!(Health::Critical < Health::Warning);
        assert!(Health::Warning < Health::Good);
        assert!(Health::Good < Health::Excellent);
        assert_eq!(Health::Good.min(Health::Warning), Health::Warning);
    }

    #[test]
    fn job_is_frozen_after_completion() {
        let mut job = IngestionJob::scheduled("openstates-bills", JobKind::Sync, JobTrigger::Manual);
        assert_eq!(job.status, JobStatus::Scheduled);
        job.start();
        assert_eq!(job.status, JobStatus::Running);
        job.record_error("record 3: missing title");

        let mut done = job.complete();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.finished_at.is_some());

        done.record_error("late error");
        assert_eq!(done.errors.len(), 1);
        let refailed = done.clone().fail("again");
        assert_eq!(refailed.status, JobStatus::Completed);
        assert_eq!(refailed, done);
    }

    #[test]
    fn source_enters_error_after_threshold_and_recovers() {
        let now = Utc::now();
        let mut source = SourceDescriptor::new("openstates-bills", "Bills", Layer::Foundation);
        source.record_failure(now, None, 2);
        assert_eq!(source.status, SourceStatus::Active);
        source.record_failure(now, None, 2);
        assert_eq!(source.status, SourceStatus::Error);
        assert!(source.is_runnable());

        source.record_success(now, None);
        assert_eq!(source.status, SourceStatus::Active);
        assert_eq!(source.consecutive_errors, 0);
    }

    #[test]
    fn paused_source_is_not_runnable_and_stays_paused_on_failure() {
        let mut source = SourceDescriptor::new("news", "News", Layer::Speed);
        source.status = SourceStatus::Paused;
        assert!(!source.is_runnable());
        source.record_failure(Utc::now(), None, 1);
        assert_eq!(source.status, SourceStatus::Paused);
    }
}
