// Manual trigger surface: `sync <layer> [platform]`, `status`, `stop`.

use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use capitolwatch_common::{IngestionJob, JobStatus, Layer, PipelineStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCommand {
    /// Run one layer now. For the speed layer an optional platform narrows
    /// the poll to a single platform.
    Sync {
        layer: Layer,
        platform: Option<String>,
    },
    Status,
    Stop,
}

impl FromStr for TriggerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().ok_or_else(|| "empty command".to_string())?;
        let parsed = match command.to_ascii_lowercase().as_str() {
            "sync" => {
                let layer = words.next().ok_or_else(|| {
                    "usage: sync <foundation|speed|intelligence> [platform]".to_string()
                })?;
                let layer = layer.parse::<Layer>()?;
                Self::Sync {
                    layer,
                    platform: words.next().map(str::to_string),
                }
            }
            "status" => Self::Status,
            "stop" => Self::Stop,
            other => return Err(format!("unknown command `{other}`")),
        };
        match words.next() {
            Some(extra) => Err(format!("unexpected argument `{extra}`")),
            None => Ok(parsed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub total: u64,
    pub new: u64,
    pub updated: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    /// First job of the run; `None` when nothing was runnable.
    pub job_id: Option<Uuid>,
    pub job_ids: Vec<Uuid>,
    pub counts: SyncCounts,
    /// Every job's error list, verbatim, in job order.
    pub errors: Vec<String>,
}

impl SyncResponse {
    /// Successful only if no job ended `failed`.
    pub fn from_jobs(jobs: &[IngestionJob]) -> Self {
        let mut counts = SyncCounts::default();
        let mut errors = Vec::new();
        for job in jobs {
            counts.total += job.counts.records_seen;
            counts.new += job.counts.records_added;
            counts.updated += job.counts.records_updated;
            counts.errors += job.counts.errors;
            errors.extend(job.errors.iter().cloned());
        }
        Self {
            success: jobs.iter().all(|j| j.status != JobStatus::Failed),
            job_id: jobs.first().map(|j| j.id),
            job_ids: jobs.iter().map(|j| j.id).collect(),
            counts,
            errors,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TriggerResponse {
    Sync(SyncResponse),
    Status(Box<PipelineStatus>),
    Stopped { stopped: bool },
    Error { success: bool, error: String },
}

impl TriggerResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            success: false,
            error: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Sync(sync) if !sync.success => 1,
            Self::Error { .. } => 2,
            _ => 0,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!("{{\"success\": false, \"error\": \"serialization failed: {e}\"}}")
        })
    }
}
