// Intelligence layer: queued, rate-limited AI analysis of entities and
// documents produced by the other two layers.

pub mod changes;
pub mod prompts;
pub mod provider;
pub mod queue;
pub mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use capitolwatch_common::{
    AnalysisArtifact, AnalysisError, AnalysisRequest, AnalysisResult, ArtifactQuality,
    CapitolWatchError, Config, IngestionJob, JobKind, JobStatus, JobTrigger,
};

use crate::deps::IngestDeps;

pub use provider::{AnalysisProvider, ClaudeProvider, ProviderResponse};
pub use queue::AnalysisQueue;
pub use rate_limit::RateLimiter;

/// Attempts per request before a transient provider failure is final.
pub const MAX_ATTEMPTS: u32 = 3;

// Haiku list pricing, USD per million tokens.
const INPUT_USD_PER_MTOK: f64 = 0.80;
const OUTPUT_USD_PER_MTOK: f64 = 4.00;

const PENDING_SUMMARY: &str = "Analysis pending: provider response was not well-formed";

#[derive(Debug, Clone)]
pub struct IntelligenceSettings {
    pub source_id: String,
    pub batch_size: usize,
    pub interval: Duration,
    pub timeout: Duration,
    pub max_calls_per_minute: u32,
    pub queue_capacity: usize,
}

impl IntelligenceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_id: "analysis".to_string(),
            batch_size: config.analysis_batch_size.max(1),
            interval: Duration::from_secs(config.analysis_interval_secs),
            timeout: Duration::from_secs(config.analysis_timeout_secs),
            max_calls_per_minute: config.analysis_max_calls_per_minute,
            queue_capacity: config.analysis_queue_capacity,
        }
    }
}

impl Default for IntelligenceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct IntelligenceCoordinator {
    deps: IngestDeps,
    provider: Arc<dyn AnalysisProvider>,
    queue: Arc<AnalysisQueue>,
    limiter: RateLimiter,
    settings: IntelligenceSettings,
}

impl IntelligenceCoordinator {
    pub fn new(
        deps: IngestDeps,
        provider: Arc<dyn AnalysisProvider>,
        settings: IntelligenceSettings,
    ) -> Self {
        Self {
            queue: Arc::new(AnalysisQueue::new(settings.queue_capacity)),
            limiter: RateLimiter::per_minute(settings.max_calls_per_minute),
            deps,
            provider,
            settings,
        }
    }

    /// Shared handle the other layers enqueue into.
    pub fn queue(&self) -> Arc<AnalysisQueue> {
        self.queue.clone()
    }

    pub fn source_id(&self) -> &str {
        &self.settings.source_id
    }

    /// Scheduled loop. Each wake processes one batch; shutdown is observed
    /// only between batches.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            source = self.settings.source_id.as_str(),
            interval_secs = self.settings.interval.as_secs(),
            batch_size = self.settings.batch_size,
            "Intelligence coordinator started"
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
                    self.process_batch(JobTrigger::Schedule).await;
                }
            }
        }
        info!("Intelligence coordinator stopped");
    }

    /// Take up to `batch_size` queued requests and analyze them under one job.
    /// `None` when there was nothing to do or the source is paused.
    pub async fn process_batch(&self, trigger: JobTrigger) -> Option<IngestionJob> {
        let source = self.deps.registry.get(&self.settings.source_id).await;
        let runnable = source.as_ref().map(|s| s.is_runnable()).unwrap_or(true);
        if !runnable && trigger == JobTrigger::Schedule {
            return None;
        }
        let batch = self.queue.take_batch(self.settings.batch_size).await;
        if batch.is_empty() {
            return None;
        }
        Some(self.run_job(batch, trigger).await)
    }

    /// Analyze one request immediately, out of band from the queue.
    pub async fn analyze_now(&self, request: AnalysisRequest) -> IngestionJob {
        self.run_job(vec![request], JobTrigger::Manual).await
    }

    async fn run_job(&self, batch: Vec<AnalysisRequest>, trigger: JobTrigger) -> IngestionJob {
        let scheduled =
            IngestionJob::scheduled(self.settings.source_id.clone(), JobKind::Analyze, trigger);
        let mut job = self.deps.jobs.begin(scheduled).await;
        job.annotate("model", self.provider.model());

        let mut degraded = 0u64;
        let mut requeued = 0u64;
        let mut cost = 0.0;

        for mut request in batch {
            job.counts.records_seen += 1;
            match self.analyze(&request).await {
                Ok(artifact) => {
                    job.counts.records_added += 1;
                    cost += artifact.cost_estimate_usd;
                    if artifact.quality == ArtifactQuality::Pending {
                        degraded += 1;
                    }
                }
                Err(err) => {
                    job.counts.errors += 1;
                    job.record_error(format!(
                        "{} {}: {err}",
                        request.source_type, request.source_id
                    ));
                    request.attempts += 1;
                    let transient =
                        matches!(&err, CapitolWatchError::Analysis(e) if e.is_transient());
                    if transient && request.attempts < MAX_ATTEMPTS {
                        match self.queue.requeue(request).await {
                            Ok(()) => requeued += 1,
                            Err(e) => warn!(error = %e, "Could not requeue analysis request"),
                        }
                    } else {
                        warn!(
                            source_type = %request.source_type,
                            source_id = request.source_id.as_str(),
                            attempts = request.attempts,
                            error = %err,
                            "Analysis request dropped"
                        );
                    }
                }
            }
        }

        job.annotate("degraded", degraded);
        job.annotate("requeued", requeued);
        job.annotate("cost_estimate_usd", cost);

        let now = Utc::now();
        let next = chrono::Duration::from_std(self.settings.interval)
            .ok()
            .map(|d| now + d);
        let finished = if job.counts.records_added > 0 {
            job.complete()
        } else {
            job.fail("no analysis request succeeded")
        };
        let succeeded = finished.status == JobStatus::Completed;
        let threshold = self.deps.error_threshold;
        if let Err(e) = self
            .deps
            .registry
            .update(&self.settings.source_id, |s| {
                if succeeded {
                    s.record_success(now, next);
                } else {
                    s.record_failure(now, next, threshold);
                }
            })
            .await
        {
            warn!(
                source = self.settings.source_id.as_str(),
                error = %e,
                "Failed to record analysis batch outcome"
            );
        }
        self.deps.jobs.finish(finished).await
    }

    /// One provider call plus persistence. Malformed output becomes a pending
    /// artifact; every other provider failure is returned to the caller.
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisArtifact, CapitolWatchError> {
        self.limiter.acquire().await;

        let prompt = prompts::build_prompt(request);
        let call = self.provider.complete(prompts::SYSTEM_PROMPT, &prompt);
        let response = match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::ProviderTimeout(self.settings.timeout.as_secs())),
        };

        let (result, quality, cost) = match response {
            Ok(resp) => {
                let cost = estimate_cost(&resp, &prompt);
                match prompts::parse_result(&resp.text) {
                    Some(result) => (result, ArtifactQuality::Complete, cost),
                    None => (pending_result(), ArtifactQuality::Pending, cost),
                }
            }
            Err(AnalysisError::ProviderMalformed(msg)) => {
                warn!(
                    source_id = request.source_id.as_str(),
                    error = msg.as_str(),
                    "Provider response malformed, writing pending artifact"
                );
                (pending_result(), ArtifactQuality::Pending, 0.0)
            }
            Err(err) => return Err(err.into()),
        };

        let mut artifact = AnalysisArtifact {
            id: Uuid::new_v4(),
            source_type: request.source_type,
            source_id: request.source_id.clone(),
            analysis_type: request.source_type.analysis_type(),
            result,
            quality,
            model: self.provider.model().to_string(),
            cost_estimate_usd: cost,
            change_summary: None,
            created_at: Utc::now(),
        };

        if request.source_type.is_versioned() && quality == ArtifactQuality::Complete {
            match self
                .deps
                .store
                .latest_artifact(request.source_type, &request.source_id)
                .await
            {
                Ok(Some(previous)) if previous.quality == ArtifactQuality::Complete => {
                    artifact.change_summary = Some(changes::describe_changes(&previous, &artifact));
                }
                Ok(_) => {}
                Err(e) => warn!(
                    source_id = request.source_id.as_str(),
                    error = %e,
                    "Could not load previous artifact, skipping change detection"
                ),
            }
        }

        self.deps.store.insert_artifact(artifact.clone()).await?;
        info!(
            source_type = %artifact.source_type,
            source_id = artifact.source_id.as_str(),
            quality = ?artifact.quality,
            cost_usd = artifact.cost_estimate_usd,
            changed = artifact.change_summary.is_some(),
            "Analysis artifact written"
        );
        Ok(artifact)
    }
}

fn pending_result() -> AnalysisResult {
    AnalysisResult {
        summary: PENDING_SUMMARY.to_string(),
        ..AnalysisResult::default()
    }
}

/// Token-priced cost, or a characters/4 estimate when the provider reported
/// no usage.
pub fn estimate_cost(response: &ProviderResponse, prompt: &str) -> f64 {
    let (input, output) = if response.input_tokens == 0 && response.output_tokens == 0 {
        (
            (prompt.chars().count() / 4) as f64,
            (response.text.chars().count() / 4) as f64,
        )
    } else {
        (response.input_tokens as f64, response.output_tokens as f64)
    };
    (input * INPUT_USD_PER_MTOK + output * OUTPUT_USD_PER_MTOK) / 1_000_000.0
}
