// Pipeline status aggregation. Everything here is a pure function over
// snapshots; computing status never schedules work.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use capitolwatch_common::{
    Health, IngestionJob, JobStatus, Layer, LayerStatus, PipelineStatus, SourceDescriptor,
    SourceHealth, SourceStatus,
};

/// Failure-ratio bands for per-source health.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub excellent_max: f64,
    pub good_max: f64,
    pub warning_max: f64,
    /// How many of a source's most recent jobs are considered.
    pub window: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            excellent_max: 0.05,
            good_max: 0.20,
            warning_max: 0.50,
            window: 20,
        }
    }
}

impl HealthThresholds {
    pub fn health_for_ratio(&self, ratio: f64) -> Health {
        if ratio <= self.excellent_max {
            Health::Excellent
        } else if ratio <= self.good_max {
            Health::Good
        } else if ratio <= self.warning_max {
            Health::Warning
        } else {
            Health::Critical
        }
    }
}

fn health_for_score(score: u8) -> Health {
    match score {
        90..=100 => Health::Excellent,
        75..=89 => Health::Good,
        50..=74 => Health::Warning,
        _ => Health::Critical,
    }
}

/// Paused and not-yet-configured sources say nothing about pipeline health.
fn is_evaluable(source: &SourceDescriptor) -> bool {
    matches!(source.status, SourceStatus::Active | SourceStatus::Error)
}

/// Summarise one source from its most recent jobs (newest first).
pub fn source_health(
    source: &SourceDescriptor,
    recent_jobs: &[IngestionJob],
    thresholds: &HealthThresholds,
) -> SourceHealth {
    let window: Vec<&IngestionJob> = recent_jobs
        .iter()
        .filter(|j| j.status.is_terminal())
        .take(thresholds.window)
        .collect();
    let failed = window
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    let failure_ratio = if window.is_empty() {
        0.0
    } else {
        failed as f64 / window.len() as f64
    };

    let health = if source.status == SourceStatus::Error {
        Health::Critical
    } else {
        thresholds.health_for_ratio(failure_ratio)
    };

    SourceHealth {
        source_id: source.id.clone(),
        name: source.name.clone(),
        layer: source.layer,
        status: source.status,
        consecutive_errors: source.consecutive_errors,
        last_run: source.last_run,
        next_run: source.next_run,
        recent_jobs: window.len(),
        failed_jobs: failed,
        failure_ratio,
        health,
    }
}

/// Build the pipeline status from descriptors and each source's recent jobs.
/// Never fails; with nothing to evaluate the pipeline reports `critical`.
pub fn compute_status(
    sources: &[SourceDescriptor],
    jobs_by_source: &HashMap<String, Vec<IngestionJob>>,
    running_jobs: usize,
    analysis_queue_depth: usize,
    thresholds: &HealthThresholds,
    now: DateTime<Utc>,
) -> PipelineStatus {
    let empty = Vec::new();
    let summaries: Vec<SourceHealth> = sources
        .iter()
        .map(|s| {
            let jobs = jobs_by_source.get(&s.id).unwrap_or(&empty);
            source_health(s, jobs, thresholds)
        })
        .collect();

    let layers = Layer::ALL
        .iter()
        .map(|layer| LayerStatus {
            layer: *layer,
            active_sources: sources
                .iter()
                .filter(|s| s.layer == *layer && s.status == SourceStatus::Active)
                .count(),
            total_sources: sources.iter().filter(|s| s.layer == *layer).count(),
        })
        .collect();

    let evaluable: Vec<(&SourceDescriptor, &SourceHealth)> = sources
        .iter()
        .zip(summaries.iter())
        .filter(|(s, _)| is_evaluable(s))
        .collect();

    let (health_score, health) = if evaluable.is_empty() {
        (0, Health::Critical)
    } else {
        let active = evaluable
            .iter()
            .filter(|(s, _)| s.status == SourceStatus::Active)
            .count() as f64;
        let total = evaluable.len() as f64;
        let mean_ratio =
            evaluable.iter().map(|(_, h)| h.failure_ratio).sum::<f64>() / total;
        let score = (100.0 * (active / total) * (1.0 - mean_ratio))
            .round()
            .clamp(0.0, 100.0) as u8;
        let worst = evaluable
            .iter()
            .map(|(_, h)| h.health)
            .min()
            .unwrap_or(Health::Critical);
        (score, health_for_score(score).min(worst))
    };

    PipelineStatus {
        generated_at: now,
        layers,
        sources: summaries,
        health_score,
        health,
        running_jobs,
        analysis_queue_depth,
    }
}
