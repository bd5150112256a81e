// Top-level process: owns the coordinators, their loops and the manual
// trigger operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use capitolwatch_common::{
    AnalysisRequest, CapitolWatchError, Config, EntityKind, IngestionJob, JobTrigger, Layer,
    PipelineStatus, SourceDescriptor, SourceStatus,
};

use crate::connectors::feeds::FeedConnector;
use crate::connectors::openstates::OpenStatesConnector;
use crate::connectors::posts::PostsConnector;
use crate::connectors::SourceConnector;
use crate::deps::IngestDeps;
use crate::foundation::{FoundationCoordinator, FoundationEndpoint, TickReport};
use crate::health::compute_status;
use crate::intelligence::{ClaudeProvider, IntelligenceCoordinator, IntelligenceSettings};
use crate::speed::{Platform, SpeedCoordinator};
use crate::trigger::{SyncResponse, TriggerCommand, TriggerResponse};

pub struct Orchestrator {
    deps: IngestDeps,
    foundation: Option<Arc<FoundationCoordinator>>,
    speed: Option<Arc<SpeedCoordinator>>,
    intelligence: Option<Arc<IntelligenceCoordinator>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(deps: IngestDeps) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            deps,
            foundation: None,
            speed: None,
            intelligence: None,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_foundation(mut self, coordinator: FoundationCoordinator) -> Self {
        self.foundation = Some(Arc::new(coordinator));
        self
    }

    pub fn with_speed(mut self, coordinator: SpeedCoordinator) -> Self {
        self.speed = Some(Arc::new(coordinator));
        self
    }

    pub fn with_intelligence(mut self, coordinator: IntelligenceCoordinator) -> Self {
        self.intelligence = Some(Arc::new(coordinator));
        self
    }

    /// Register every configured source and build the coordinators whose
    /// credentials are present. A layer missing its credentials logs a
    /// configuration error and stays down; the others still run.
    pub async fn from_config(config: &Config, deps: IngestDeps) -> Self {
        let registry = deps.registry.clone();
        let timeout = Duration::from_secs(config.connector_timeout_secs);

        // Intelligence first: the other layers feed its queue.
        let intelligence = match config.require_anthropic_key() {
            Ok(key) => {
                let settings = IntelligenceSettings::from_config(config);
                registry
                    .register(SourceDescriptor::new(
                        settings.source_id.clone(),
                        "AI analysis",
                        Layer::Intelligence,
                    ))
                    .await;
                let provider = ClaudeProvider::new(
                    key,
                    &config.analysis_model,
                    Duration::from_secs(config.analysis_timeout_secs),
                );
                Some(IntelligenceCoordinator::new(
                    deps.clone(),
                    Arc::new(provider),
                    settings,
                ))
            }
            Err(e) => {
                error!(error = %e, "Intelligence layer not started");
                registry
                    .register(
                        SourceDescriptor::new("analysis", "AI analysis", Layer::Intelligence)
                            .unavailable(),
                    )
                    .await;
                None
            }
        };
        let queue = intelligence.as_ref().map(|i| i.queue());

        let foundation_sources = [
            ("openstates-bills", "Open States bills", EntityKind::Bill),
            ("openstates-people", "Open States legislators", EntityKind::Legislator),
            ("openstates-committees", "Open States committees", EntityKind::Committee),
        ];
        let foundation = match config.require_openstates_key() {
            Ok(key) => {
                let mut endpoints = Vec::new();
                for (id, name, kind) in foundation_sources {
                    let mut source = SourceDescriptor::new(id, name, Layer::Foundation)
                        .with_config("jurisdiction", config.jurisdiction.as_str());
                    if let Some(session) = &config.session {
                        source = source.with_config("session", session.as_str());
                    }
                    registry.register(source).await;
                    let connector = OpenStatesConnector::from_parts(
                        id,
                        key,
                        &config.openstates_base_url,
                        timeout,
                        kind,
                        &config.jurisdiction,
                    )
                    .with_session(config.session.clone())
                    .with_max_pages(config.foundation_max_pages);
                    endpoints.push(FoundationEndpoint {
                        source_id: id.to_string(),
                        kind,
                        connector: Arc::new(connector),
                    });
                }
                let mut coordinator = FoundationCoordinator::new(
                    deps.clone(),
                    endpoints,
                    Duration::from_secs(config.foundation_interval_secs),
                );
                if let Some(queue) = &queue {
                    coordinator = coordinator.with_analysis_queue(queue.clone());
                }
                Some(coordinator)
            }
            Err(e) => {
                error!(error = %e, "Foundation layer not started");
                for (id, name, _) in foundation_sources {
                    registry
                        .register(SourceDescriptor::new(id, name, Layer::Foundation).unavailable())
                        .await;
                }
                None
            }
        };

        let mut platforms = Vec::new();
        let feeds = [
            ("news", "News feeds", &config.news_feeds),
            ("press", "Press releases", &config.press_feeds),
        ];
        for (platform, name, urls) in feeds {
            let source_id = format!("speed-{platform}");
            let source = SourceDescriptor::new(source_id.clone(), name, Layer::Speed)
                .with_config("feeds", urls.join(","));
            if urls.is_empty() {
                registry.register(source.unavailable()).await;
                continue;
            }
            registry.register(source).await;
            let connector: Arc<dyn SourceConnector> =
                Arc::new(FeedConnector::new(source_id.clone(), urls.clone(), timeout));
            platforms.push(Platform {
                name: platform.to_string(),
                source_id,
                connector,
            });
        }
        let posts = [
            ("social", "Social posts", &config.social_endpoint, &config.social_api_key),
            ("video", "Video", &config.video_endpoint, &config.video_api_key),
        ];
        for (platform, name, endpoint, api_key) in posts {
            let source_id = format!("speed-{platform}");
            let source = SourceDescriptor::new(source_id.clone(), name, Layer::Speed);
            let Some(endpoint) = endpoint else {
                registry.register(source.unavailable()).await;
                continue;
            };
            registry
                .register(source.with_config("endpoint", endpoint.as_str()))
                .await;
            let connector: Arc<dyn SourceConnector> = Arc::new(PostsConnector::new(
                source_id.clone(),
                endpoint.as_str(),
                api_key.clone(),
                timeout,
            ));
            platforms.push(Platform {
                name: platform.to_string(),
                source_id,
                connector,
            });
        }
        let speed = if platforms.is_empty() {
            warn!("No speed platforms configured");
            None
        } else {
            let mut coordinator = SpeedCoordinator::new(
                deps.clone(),
                platforms,
                Duration::from_secs(config.speed_interval_secs),
            );
            if let Some(queue) = &queue {
                coordinator = coordinator.with_analysis_queue(queue.clone());
            }
            Some(coordinator)
        };

        let mut orchestrator = Self::new(deps);
        if let Some(c) = foundation {
            orchestrator = orchestrator.with_foundation(c);
        }
        if let Some(c) = speed {
            orchestrator = orchestrator.with_speed(c);
        }
        if let Some(c) = intelligence {
            orchestrator = orchestrator.with_intelligence(c);
        }
        orchestrator
    }

    pub fn deps(&self) -> &IngestDeps {
        &self.deps
    }

    /// Spawn every layer loop. Calling `start` on a running orchestrator is a
    /// no-op.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            warn!("Orchestrator already started");
            return;
        }
        self.shutdown.send_replace(false);

        if let Some(foundation) = &self.foundation {
            let rx = self.shutdown.subscribe();
            tasks.push(tokio::spawn(foundation.clone().run(rx)));
        }
        if let Some(speed) = &self.speed {
            for name in speed.platform_names() {
                let rx = self.shutdown.subscribe();
                tasks.push(tokio::spawn(speed.clone().run_platform(name, rx)));
            }
        }
        if let Some(intelligence) = &self.intelligence {
            let rx = self.shutdown.subscribe();
            tasks.push(tokio::spawn(intelligence.clone().run(rx)));
        }
        info!(loops = tasks.len(), "Orchestrator started");
    }

    /// Signal every loop to exit and wait for in-flight work to finish.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        let count = handles.len();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Layer loop ended abnormally");
            }
        }
        info!(loops = count, "Orchestrator stopped");
    }

    pub async fn trigger_foundation_sync(&self) -> Result<TickReport, CapitolWatchError> {
        let foundation = self
            .foundation
            .as_ref()
            .ok_or(CapitolWatchError::LayerUnavailable(Layer::Foundation))?;
        Ok(foundation.tick(JobTrigger::Manual).await)
    }

    pub async fn trigger_speed_poll(
        &self,
        platform: &str,
    ) -> Result<Option<IngestionJob>, CapitolWatchError> {
        let speed = self
            .speed
            .as_ref()
            .ok_or_else(|| CapitolWatchError::UnknownPlatform(platform.to_string()))?;
        speed.poll_platform(platform, JobTrigger::Manual).await
    }

    /// Poll every platform once, concurrently.
    pub async fn trigger_speed_poll_all(&self) -> Result<Vec<IngestionJob>, CapitolWatchError> {
        let speed = self
            .speed
            .as_ref()
            .ok_or(CapitolWatchError::LayerUnavailable(Layer::Speed))?;
        let names = speed.platform_names();
        let polls = names
            .iter()
            .map(|name| speed.poll_platform(name, JobTrigger::Manual));
        let mut jobs = Vec::new();
        for result in join_all(polls).await {
            if let Some(job) = result? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    pub async fn trigger_analysis(
        &self,
        request: AnalysisRequest,
    ) -> Result<IngestionJob, CapitolWatchError> {
        let intelligence = self.intelligence()?;
        Ok(intelligence.analyze_now(request).await)
    }

    /// Process one queued batch now.
    pub async fn process_analysis_queue(&self) -> Result<Option<IngestionJob>, CapitolWatchError> {
        let intelligence = self.intelligence()?;
        Ok(intelligence.process_batch(JobTrigger::Manual).await)
    }

    fn intelligence(&self) -> Result<&Arc<IntelligenceCoordinator>, CapitolWatchError> {
        self.intelligence
            .as_ref()
            .ok_or(CapitolWatchError::LayerUnavailable(Layer::Intelligence))
    }

    pub async fn pause_source(&self, id: &str) -> Result<SourceDescriptor, CapitolWatchError> {
        let source = self
            .deps
            .registry
            .update(id, |s| {
                if s.status != SourceStatus::NotYetAvailable {
                    s.status = SourceStatus::Paused;
                }
            })
            .await?;
        info!(source = id, status = %source.status, "Source paused");
        Ok(source)
    }

    /// Paused sources come back as active with a clean error count. A source
    /// that was never configured stays unavailable.
    pub async fn resume_source(&self, id: &str) -> Result<SourceDescriptor, CapitolWatchError> {
        let source = self
            .deps
            .registry
            .update(id, |s| {
                if s.status == SourceStatus::Paused {
                    s.status = SourceStatus::Active;
                    s.consecutive_errors = 0;
                }
            })
            .await?;
        info!(source = id, status = %source.status, "Source resumed");
        Ok(source)
    }

    /// Pure read over descriptors and recent jobs.
    pub async fn status(&self) -> PipelineStatus {
        let sources = self.deps.registry.snapshot().await;
        let window = self.deps.thresholds.window;
        let mut jobs_by_source = HashMap::new();
        for source in &sources {
            let jobs = self.deps.jobs.recent_for_source(&source.id, window).await;
            jobs_by_source.insert(source.id.clone(), jobs);
        }
        let queue_depth = match &self.intelligence {
            Some(i) => i.queue().len().await,
            None => 0,
        };
        compute_status(
            &sources,
            &jobs_by_source,
            self.deps.jobs.running_count().await,
            queue_depth,
            &self.deps.thresholds,
            Utc::now(),
        )
    }

    pub async fn execute(&self, command: TriggerCommand) -> TriggerResponse {
        let jobs = match command {
            TriggerCommand::Status => {
                return TriggerResponse::Status(Box::new(self.status().await));
            }
            TriggerCommand::Stop => {
                self.stop().await;
                return TriggerResponse::Stopped { stopped: true };
            }
            TriggerCommand::Sync {
                layer: Layer::Foundation,
                ..
            } => self.trigger_foundation_sync().await.map(|report| report.jobs),
            TriggerCommand::Sync {
                layer: Layer::Speed,
                platform: Some(platform),
            } => self
                .trigger_speed_poll(&platform)
                .await
                .map(|job| job.into_iter().collect()),
            TriggerCommand::Sync {
                layer: Layer::Speed,
                platform: None,
            } => self.trigger_speed_poll_all().await,
            TriggerCommand::Sync {
                layer: Layer::Intelligence,
                ..
            } => self
                .process_analysis_queue()
                .await
                .map(|job| job.into_iter().collect()),
        };
        match jobs {
            Ok(jobs) => TriggerResponse::Sync(SyncResponse::from_jobs(&jobs)),
            Err(e) => TriggerResponse::error(e.to_string()),
        }
    }
}
