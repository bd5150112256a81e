// Foundation layer: scheduled full/delta syncs of ground-truth entities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use capitolwatch_common::{
    AnalysisRequest, AnalysisSourceType, Bill, CanonicalEntity, EntityKind, FieldChange,
    IngestionJob, JobCounts, JobKind, JobStatus, JobTrigger, SourceDescriptor, SourceStatus,
};

use crate::connectors::SourceConnector;
use crate::deps::IngestDeps;
use crate::intelligence::AnalysisQueue;
use crate::reconciler::{self, MappingContext};

/// One synced endpoint: a source descriptor, the entity kind it yields and the
/// connector that fetches it.
#[derive(Clone)]
pub struct FoundationEndpoint {
    pub source_id: String,
    pub kind: EntityKind,
    pub connector: Arc<dyn SourceConnector>,
}

/// Outcome of one tick across all endpoints.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// `Completed` if at least one endpoint succeeded.
    pub status: JobStatus,
    pub jobs: Vec<IngestionJob>,
    pub counts: JobCounts,
}

impl TickReport {
    fn from_jobs(jobs: Vec<IngestionJob>) -> Self {
        let mut counts = JobCounts::default();
        for job in &jobs {
            counts.merge(&job.counts);
        }
        let status = if jobs.is_empty() || jobs.iter().any(|j| j.status == JobStatus::Completed) {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        Self {
            status,
            jobs,
            counts,
        }
    }
}

pub struct FoundationCoordinator {
    deps: IngestDeps,
    endpoints: Vec<FoundationEndpoint>,
    interval: Duration,
    analysis: Option<Arc<AnalysisQueue>>,
    /// Start time of each source's last clean sync; the next scheduled run
    /// asks only for records updated since then. A sync that skipped records
    /// or hit the page cap leaves it where it was.
    last_success: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl FoundationCoordinator {
    pub fn new(deps: IngestDeps, endpoints: Vec<FoundationEndpoint>, interval: Duration) -> Self {
        Self {
            deps,
            endpoints,
            interval,
            analysis: None,
            last_success: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_analysis_queue(mut self, queue: Arc<AnalysisQueue>) -> Self {
        self.analysis = Some(queue);
        self
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.source_id.clone()).collect()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            endpoints = self.endpoints.len(),
            interval_secs = self.interval.as_secs(),
            "Foundation coordinator started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick(JobTrigger::Schedule).await;
                }
            }
        }
        info!("Foundation coordinator stopped");
    }

    /// Sync every runnable endpoint concurrently. One endpoint failing never
    /// affects its siblings.
    pub async fn tick(&self, trigger: JobTrigger) -> TickReport {
        let mut runs = Vec::new();
        for endpoint in &self.endpoints {
            let Some(source) = self.deps.registry.get(&endpoint.source_id).await else {
                warn!(source = endpoint.source_id.as_str(), "Endpoint has no registered source");
                continue;
            };
            let manual_override = trigger == JobTrigger::Manual
                && source.status == SourceStatus::Paused;
            if !source.is_runnable() && !manual_override {
                continue;
            }
            runs.push(self.sync_endpoint(endpoint, source, trigger));
        }

        let report = TickReport::from_jobs(join_all(runs).await);
        info!(
            status = %report.status,
            jobs = report.jobs.len(),
            counts = %report.counts,
            "Foundation tick finished"
        );
        report
    }

    async fn sync_endpoint(
        &self,
        endpoint: &FoundationEndpoint,
        source: SourceDescriptor,
        trigger: JobTrigger,
    ) -> IngestionJob {
        let scheduled = IngestionJob::scheduled(source.id.clone(), JobKind::Sync, trigger);
        let mut job = self.deps.jobs.begin(scheduled).await;
        let started = Utc::now();

        let since = match trigger {
            JobTrigger::Schedule if endpoint.connector.supports_since() => {
                self.last_success.lock().await.get(&source.id).copied()
            }
            _ => None,
        };
        job.annotate("mode", if since.is_some() { "delta" } else { "full" });
        job.annotate("entity_kind", endpoint.kind.to_string());

        let next_run = chrono::Duration::from_std(self.interval)
            .ok()
            .map(|d| started + d);
        let threshold = self.deps.error_threshold;

        let batch = match self
            .deps
            .retry
            .fetch(endpoint.connector.as_ref(), &source, since)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                warn!(source = source.id.as_str(), error = %err, "Foundation fetch failed");
                if let Err(e) = self
                    .deps
                    .registry
                    .update(&source.id, |s| s.record_failure(Utc::now(), next_run, threshold))
                    .await
                {
                    warn!(source = source.id.as_str(), error = %e, "Failed to record sync failure");
                }
                return self.deps.jobs.finish(job.fail(err.to_string())).await;
            }
        };
        job.annotate("pages_fetched", batch.pages_fetched);
        job.annotate("truncated", batch.truncated);

        let ctx = MappingContext {
            default_jurisdiction: source
                .config
                .get("jurisdiction")
                .cloned()
                .unwrap_or_else(|| self.deps.jurisdiction.clone()),
            now: started,
        };
        let mapped = reconciler::map_batch(&batch.records, endpoint.kind, &ctx);
        let existing = reconciler::lookup_existing(self.deps.store.as_ref(), &mapped).await;
        let plan = mapped.plan(&existing);
        let report =
            reconciler::apply(self.deps.store.as_ref(), &plan, &source.id, Utc::now()).await;

        job.counts = report.counts;
        for error in &report.errors {
            job.record_error(error.clone());
        }

        if report.counts.errors == 0 && !batch.truncated {
            self.last_success
                .lock()
                .await
                .insert(source.id.clone(), started);
        } else {
            job.annotate("cursor_held", true);
            info!(
                source = source.id.as_str(),
                errors = report.counts.errors,
                truncated = batch.truncated,
                "Delta cursor held, next sync re-fetches from the previous cursor"
            );
        }
        if let Err(e) = self
            .deps
            .registry
            .update(&source.id, |s| s.record_success(Utc::now(), next_run))
            .await
        {
            warn!(source = source.id.as_str(), error = %e, "Failed to record sync success");
        }

        if let Some(queue) = &self.analysis {
            let queued = enqueue_analysis(queue, &report.inserted, &report.updated).await;
            job.annotate("analysis_queued", queued);
        }

        self.deps.jobs.finish(job.complete()).await
    }
}

/// Queue analysis for new bills, for fiscal notes on bills that are new or
/// whose documents changed, and for bill text on bills that are new or whose
/// versions changed. Returns how many requests were accepted.
async fn enqueue_analysis(
    queue: &AnalysisQueue,
    inserted: &[CanonicalEntity],
    updated: &[(CanonicalEntity, Vec<FieldChange>)],
) -> u64 {
    let mut requests = Vec::new();
    for entity in inserted {
        if let CanonicalEntity::Bill(bill) = entity {
            let key = entity.natural_key().to_string();
            requests.push(AnalysisRequest::new(
                AnalysisSourceType::Bill,
                key.clone(),
                bill_content(bill),
            ));
            requests.extend(fiscal_note_requests(&key, bill));
            requests.extend(bill_text_requests(&key, bill));
        }
    }
    for (entity, changes) in updated {
        if let CanonicalEntity::Bill(bill) = entity {
            let key = entity.natural_key().to_string();
            if changes.iter().any(|c| c.field == "documents") {
                requests.extend(fiscal_note_requests(&key, bill));
            }
            if changes.iter().any(|c| c.field == "versions") {
                requests.extend(bill_text_requests(&key, bill));
            }
        }
    }

    let mut accepted = 0;
    for request in requests {
        if queue.enqueue(request).await.is_ok() {
            accepted += 1;
        }
    }
    accepted
}

fn fiscal_note_requests(key: &str, bill: &Bill) -> Vec<AnalysisRequest> {
    let notes: Vec<String> = bill
        .fiscal_notes()
        .map(|doc| format!("{}: {}", doc.note, doc.url))
        .collect();
    if notes.is_empty() {
        return Vec::new();
    }
    vec![AnalysisRequest::new(
        AnalysisSourceType::FiscalNote,
        format!("{key}#fiscal-note"),
        format!(
            "Fiscal note for {} ({}).\n{}\n{}",
            bill.identifier,
            bill.session,
            bill.title,
            notes.join("\n")
        ),
    )]
}

/// Document requests carry the version list (notes and links), not the
/// fetched document body.
fn bill_text_requests(key: &str, bill: &Bill) -> Vec<AnalysisRequest> {
    if bill.versions.is_empty() {
        return Vec::new();
    }
    let versions: Vec<String> = bill
        .versions
        .iter()
        .map(|v| format!("{}: {}", v.note, v.url))
        .collect();
    vec![AnalysisRequest::new(
        AnalysisSourceType::BillText,
        format!("{key}#text"),
        format!(
            "Text versions of {} ({}).\n{}\n{}",
            bill.identifier,
            bill.session,
            bill.title,
            versions.join("\n")
        ),
    )]
}

fn bill_content(bill: &Bill) -> String {
    let mut lines = vec![format!("{} ({}): {}", bill.identifier, bill.session, bill.title)];
    if !bill.subjects.is_empty() {
        lines.push(format!("Subjects: {}", bill.subjects.join(", ")));
    }
    if !bill.sponsors.is_empty() {
        lines.push(format!("Sponsors: {}", bill.sponsors.join(", ")));
    }
    if let Some(action) = &bill.latest_action {
        let date = bill.latest_action_date.as_deref().unwrap_or("undated");
        lines.push(format!("Latest action ({date}): {action}"));
    }
    lines.join("\n")
}
