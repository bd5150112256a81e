use std::sync::Arc;

use typed_builder::TypedBuilder;

use capitolwatch_common::Config;

use crate::checkpoint::CheckpointStore;
use crate::health::HealthThresholds;
use crate::jobs::JobLog;
use crate::registry::SourceRegistry;
use crate::retry::RetryPolicy;
use crate::store::EntityStore;

/// Shared dependency container for all coordinators.
///
/// Long-lived and cheap to clone. Coordinators take what they need from here
/// at construction; nothing is looked up globally.
#[derive(Clone, TypedBuilder)]
pub struct IngestDeps {
    pub store: Arc<dyn EntityStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    #[builder(default = Arc::new(JobLog::new(1000)))]
    pub jobs: Arc<JobLog>,
    #[builder(default = Arc::new(SourceRegistry::new()))]
    pub registry: Arc<SourceRegistry>,
    #[builder(default = 3)]
    pub error_threshold: u32,
    #[builder(default)]
    pub retry: RetryPolicy,
    #[builder(default)]
    pub thresholds: HealthThresholds,
    #[builder(default = "co".to_string())]
    pub jurisdiction: String,
}

impl IngestDeps {
    /// Wire config-derived policy around the given store boundaries.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn EntityStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self::builder()
            .store(store)
            .checkpoints(checkpoints)
            .jobs(Arc::new(JobLog::new(config.job_log_capacity)))
            .error_threshold(config.source_error_threshold)
            .retry(RetryPolicy::from_config(config))
            .jurisdiction(config.jurisdiction.clone())
            .build()
    }
}
