// Speed layer: per-platform polling of high-churn content into signals.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use capitolwatch_common::{
    AnalysisRequest, AnalysisSourceType, CapitolWatchError, IngestionJob, JobKind, JobTrigger,
    Signal, SourceDescriptor, SourceStatus,
};

use crate::connectors::{ContentItem, SourceConnector};
use crate::deps::IngestDeps;
use crate::extraction::{EntityIndex, Extraction, Extractor, ANALYSIS_RELEVANCE};
use crate::intelligence::AnalysisQueue;

const EXCERPT_CHARS: usize = 280;

/// One polled platform. `name` keys its checkpoint; `source_id` its descriptor.
#[derive(Clone)]
pub struct Platform {
    pub name: String,
    pub source_id: String,
    pub connector: Arc<dyn SourceConnector>,
}

pub struct SpeedCoordinator {
    deps: IngestDeps,
    platforms: Vec<Platform>,
    interval: Duration,
    extractor: Extractor,
    analysis: Option<Arc<AnalysisQueue>>,
}

impl SpeedCoordinator {
    pub fn new(deps: IngestDeps, platforms: Vec<Platform>, interval: Duration) -> Self {
        Self {
            extractor: Extractor::new(deps.jurisdiction.clone()),
            deps,
            platforms,
            interval,
            analysis: None,
        }
    }

    pub fn with_analysis_queue(mut self, queue: Arc<AnalysisQueue>) -> Self {
        self.analysis = Some(queue);
        self
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name.clone()).collect()
    }

    /// Polling loop for one platform. Each platform gets its own task so a
    /// slow feed never delays the others.
    pub async fn run_platform(self: Arc<Self>, name: String, mut shutdown: watch::Receiver<bool>) {
        let Some(platform) = self.platforms.iter().find(|p| p.name == name).cloned() else {
            warn!(platform = name.as_str(), "No such platform, loop not started");
            return;
        };
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            platform = platform.name.as_str(),
            interval_secs = self.interval.as_secs(),
            "Speed loop started"
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
                    self.poll(&platform, JobTrigger::Schedule).await;
                }
            }
        }
        info!(platform = platform.name.as_str(), "Speed loop stopped");
    }

    /// Out-of-band poll of one platform by name.
    pub async fn poll_platform(
        &self,
        name: &str,
        trigger: JobTrigger,
    ) -> Result<Option<IngestionJob>, CapitolWatchError> {
        let platform = self
            .platforms
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CapitolWatchError::UnknownPlatform(name.to_string()))?;
        Ok(self.poll(platform, trigger).await)
    }

    /// One poll cycle. `None` when the platform's source is not runnable.
    pub async fn poll(&self, platform: &Platform, trigger: JobTrigger) -> Option<IngestionJob> {
        let source = self.deps.registry.get(&platform.source_id).await?;
        let manual_override = trigger == JobTrigger::Manual && source.status == SourceStatus::Paused;
        if !source.is_runnable() && !manual_override {
            debug!(platform = platform.name.as_str(), status = %source.status, "Skipping poll");
            return None;
        }

        let scheduled = IngestionJob::scheduled(source.id.clone(), JobKind::Monitor, trigger);
        let mut job = self.deps.jobs.begin(scheduled).await;
        job.annotate("platform", platform.name.as_str());
        let started = Utc::now();
        let next_run = chrono::Duration::from_std(self.interval)
            .ok()
            .map(|d| started + d);
        let threshold = self.deps.error_threshold;

        let outcome = self.poll_inner(platform, &source, started, &mut job).await;
        let job = match outcome {
            Ok(()) => {
                if let Err(e) = self
                    .deps
                    .registry
                    .update(&source.id, |s| s.record_success(Utc::now(), next_run))
                    .await
                {
                    warn!(
                        platform = platform.name.as_str(),
                        error = %e,
                        "Failed to record poll success"
                    );
                }
                job.complete()
            }
            Err(err) => {
                warn!(platform = platform.name.as_str(), error = %err, "Speed poll failed");
                if let Err(e) = self
                    .deps
                    .registry
                    .update(&source.id, |s| s.record_failure(Utc::now(), next_run, threshold))
                    .await
                {
                    warn!(
                        platform = platform.name.as_str(),
                        error = %e,
                        "Failed to record poll failure"
                    );
                }
                job.fail(err.to_string())
            }
        };
        Some(self.deps.jobs.finish(job).await)
    }

    async fn poll_inner(
        &self,
        platform: &Platform,
        source: &SourceDescriptor,
        started: DateTime<Utc>,
        job: &mut IngestionJob,
    ) -> Result<(), CapitolWatchError> {
        // No checkpoint means start from now, never replay history.
        let checkpoint = match self.deps.checkpoints.get(&platform.name).await? {
            Some(ts) => ts,
            None => {
                job.annotate("checkpoint_initialized", true);
                self.deps.checkpoints.advance(&platform.name, started).await?
            }
        };
        job.annotate("since", checkpoint.to_rfc3339());

        let batch = self
            .deps
            .retry
            .fetch(platform.connector.as_ref(), source, Some(checkpoint))
            .await?;

        let parsed: Vec<ContentItem> =
            batch.records.iter().filter_map(ContentItem::from_raw).collect();
        let unparseable = batch.records.len() - parsed.len();
        if unparseable > 0 {
            job.annotate("unparseable", unparseable as u64);
        }
        let mut items: Vec<ContentItem> = parsed
            .into_iter()
            .filter(|item| item.published_at > checkpoint)
            .collect();
        items.sort_by_key(|item| item.published_at);

        let index = EntityIndex::load(self.deps.store.as_ref()).await?;

        let mut first_failure: Option<DateTime<Utc>> = None;
        let mut queued = 0u64;

        for item in &items {
            job.counts.records_seen += 1;
            let extraction = self.extractor.extract(&item.text, &index);

            if extraction.matches.is_empty() {
                job.counts.records_unchanged += 1;
            } else {
                match self.write_signals(platform, item, &extraction).await {
                    Ok(()) => {
                        job.counts.records_added += 1;
                        if extraction.relevance >= ANALYSIS_RELEVANCE
                            && self.enqueue_signal(platform, item).await
                        {
                            queued += 1;
                        }
                    }
                    Err(err) => {
                        job.counts.errors += 1;
                        job.record_error(format!("{}: {err}", item.external_id));
                        first_failure.get_or_insert(item.published_at);
                    }
                }
            }
        }

        if batch.truncated {
            // Items past the page cap were never seen; start from here again.
            job.annotate("checkpoint_held", "truncated");
        } else if let Some(ts) = checkpoint_target(&items, first_failure) {
            let effective = self.deps.checkpoints.advance(&platform.name, ts).await?;
            job.annotate("checkpoint", effective.to_rfc3339());
        }
        if queued > 0 {
            job.annotate("analysis_queued", queued);
        }

        info!(
            platform = platform.name.as_str(),
            items = items.len(),
            linked = job.counts.records_added,
            errors = job.counts.errors,
            "Speed poll finished"
        );
        Ok(())
    }

    async fn write_signals(
        &self,
        platform: &Platform,
        item: &ContentItem,
        extraction: &Extraction,
    ) -> Result<(), CapitolWatchError> {
        let captured_at = Utc::now();
        let excerpt: String = item.text.chars().take(EXCERPT_CHARS).collect();
        for m in &extraction.matches {
            let signal = Signal {
                id: Uuid::new_v4(),
                platform: platform.name.clone(),
                external_id: item.external_id.clone(),
                url: item.url.clone(),
                author: item.author.clone(),
                excerpt: excerpt.clone(),
                published_at: item.published_at,
                entity: m.key.clone(),
                matched_text: m.matched_text.clone(),
                relevance: extraction.relevance,
                sentiment: extraction.sentiment,
                captured_at,
            };
            self.deps.store.insert_signal(signal).await?;
        }
        Ok(())
    }

    async fn enqueue_signal(&self, platform: &Platform, item: &ContentItem) -> bool {
        let Some(queue) = &self.analysis else {
            return false;
        };
        let request = AnalysisRequest::new(
            AnalysisSourceType::Signal,
            format!("{}:{}", platform.name, item.external_id),
            item.text.clone(),
        );
        queue.enqueue(request).await.is_ok()
    }
}

/// Newest timestamp the checkpoint may move to. Items are sorted ascending.
/// After a failure it stops strictly below the failed item's timestamp, so
/// the failed item and any item sharing its timestamp are fetched again.
fn checkpoint_target(
    items: &[ContentItem],
    first_failure: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    items
        .iter()
        .map(|item| item.published_at)
        .filter(|ts| first_failure.map_or(true, |failed| *ts < failed))
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityStore, MemoryStore};
    use crate::testing::{legislator_entity, test_deps_with_store, MockConnector};
    use capitolwatch_common::Layer;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    async fn setup(connector: MockConnector) -> (SpeedCoordinator, IngestDeps, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let deps = test_deps_with_store(store.clone());
        deps.registry
            .register(SourceDescriptor::new("speed-news", "News", Layer::Speed))
            .await;
        let platform = Platform {
            name: "news".into(),
            source_id: "speed-news".into(),
            connector: Arc::new(connector),
        };
        (
            SpeedCoordinator::new(deps.clone(), vec![platform], Duration::from_secs(300)),
            deps,
            store,
        )
    }

    #[tokio::test]
    async fn first_poll_starts_from_now() {
        let old = (Utc::now() - ChronoDuration::days(3)).to_rfc3339();
        let connector = MockConnector::new("news")
            .then_ok(vec![json!({"id": "a", "title": "HB25-1001 passes", "published": old})]);
        let (coordinator, deps, store) = setup(connector).await;

        let job = coordinator
            .poll_platform("news", JobTrigger::Schedule)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.metadata["checkpoint_initialized"], true);
        assert_eq!(job.counts.records_seen, 0);
        assert!(store.list_signals().await.is_empty());
        assert!(deps.checkpoints.get("news").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn linked_items_become_signals_and_advance_checkpoint() {
        let start = Utc::now() - ChronoDuration::hours(1);
        let t1 = start + ChronoDuration::minutes(10);
        let t2 = start + ChronoDuration::minutes(20);
        let connector = MockConnector::new("news").then_ok(vec![
            json!({"id": "b", "title": "Weather update", "published": t2.to_rfc3339()}),
            json!({"id": "a", "title": "Sen. Doe opposes HB25-1001", "published": t1.to_rfc3339()}),
        ]);
        let (coordinator, deps, store) = setup(connector).await;
        store
            .upsert(legislator_entity("Jane Doe", "12"))
            .await
            .unwrap();
        deps.checkpoints.advance("news", start).await.unwrap();

        let job = coordinator
            .poll_platform("news", JobTrigger::Schedule)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.counts.records_seen, 2);
        assert_eq!(job.counts.records_added, 1);
        assert_eq!(job.counts.records_unchanged, 1);

        let signals = store.list_signals().await;
        assert_eq!(signals.len(), 2);
        assert!(signals.iter().all(|s| s.external_id == "a"));
        assert_eq!(deps.checkpoints.get("news").await.unwrap(), Some(t2));
    }

    #[tokio::test]
    async fn unknown_platform_is_an_error() {
        let (coordinator, _, _) = setup(MockConnector::new("news")).await;
        let err = coordinator
            .poll_platform("tiktok", JobTrigger::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, CapitolWatchError::UnknownPlatform(_)));
    }
}
