use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use capitolwatch_common::{IngestionJob, JobStatus};

/// Bounded record of ingestion jobs: the ones running now plus the most
/// recent finished ones, oldest evicted first.
pub struct JobLog {
    capacity: usize,
    running: RwLock<HashMap<Uuid, IngestionJob>>,
    finished: RwLock<VecDeque<IngestionJob>>,
}

impl JobLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            running: RwLock::new(HashMap::new()),
            finished: RwLock::new(VecDeque::new()),
        }
    }

    /// Move a scheduled job to running and track it. Returns the running copy
    /// the caller keeps mutating until `finish`.
    pub async fn begin(&self, mut job: IngestionJob) -> IngestionJob {
        job.start();
        self.running.write().await.insert(job.id, job.clone());
        job
    }

    /// Record a terminal job. Non-terminal jobs are failed on the way in so
    /// nothing stays "running" forever.
    pub async fn finish(&self, job: IngestionJob) -> IngestionJob {
        let job = if job.status.is_terminal() {
            job
        } else {
            job.fail("job finished without a terminal status")
        };
        self.running.write().await.remove(&job.id);

        match job.status {
            JobStatus::Failed => warn!(
                job_id = %job.id,
                source = job.source_id.as_str(),
                kind = %job.kind,
                errors = job.errors.len(),
                "Job failed"
            ),
            _ => info!(
                job_id = %job.id,
                source = job.source_id.as_str(),
                kind = %job.kind,
                counts = %job.counts,
                duration_ms = job.duration_ms().unwrap_or_default(),
                "Job completed"
            ),
        }

        let mut finished = self.finished.write().await;
        finished.push_back(job.clone());
        while finished.len() > self.capacity {
            finished.pop_front();
        }
        job
    }

    /// Most recent finished jobs, newest first.
    pub async fn recent(&self, n: usize) -> Vec<IngestionJob> {
        self.finished.read().await.iter().rev().take(n).cloned().collect()
    }

    /// Most recent finished jobs for one source, newest first.
    pub async fn recent_for_source(&self, source_id: &str, n: usize) -> Vec<IngestionJob> {
        self.finished
            .read()
            .await
            .iter()
            .rev()
            .filter(|j| j.source_id == source_id)
            .take(n)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<IngestionJob> {
        if let Some(job) = self.running.read().await.get(&id) {
            return Some(job.clone());
        }
        self.finished
            .read()
            .await
            .iter()
            .rev()
            .find(|j| j.id == id)
            .cloned()
    }

    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }
}
