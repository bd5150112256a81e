// Per-platform checkpoints for the speed layer.
//
// A checkpoint is the published-at timestamp of the latest item a platform
// has already processed. `advance` never moves it backwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use capitolwatch_common::CapitolWatchError;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, platform: &str) -> Result<Option<DateTime<Utc>>, CapitolWatchError>;

    /// Move the checkpoint forward to `ts`. Older timestamps are ignored.
    /// Returns the checkpoint now in effect.
    async fn advance(
        &self,
        platform: &str,
        ts: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CapitolWatchError>;
}

fn advance_in(
    map: &mut BTreeMap<String, DateTime<Utc>>,
    platform: &str,
    ts: DateTime<Utc>,
) -> (DateTime<Utc>, bool) {
    match map.get(platform) {
        Some(current) if *current >= ts => (*current, false),
        _ => {
            map.insert(platform.to_string(), ts);
            (ts, true)
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, platform: &str) -> Result<Option<DateTime<Utc>>, CapitolWatchError> {
        Ok(self.inner.lock().await.get(platform).copied())
    }

    async fn advance(
        &self,
        platform: &str,
        ts: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CapitolWatchError> {
        let mut map = self.inner.lock().await;
        Ok(advance_in(&mut map, platform, ts).0)
    }
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// Checkpoints persisted as a JSON object `{ "<platform>": "<RFC 3339>" }`.
///
/// Writes go to a sibling temp file that is then renamed over the target, so a
/// crash mid-write leaves the previous file intact.
pub struct FileCheckpointStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl FileCheckpointStore {
    /// Open (or lazily create) the checkpoint file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CapitolWatchError> {
        let path = path.as_ref().to_path_buf();
        let cache = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                CapitolWatchError::Checkpoint(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CapitolWatchError::Checkpoint(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), platforms = cache.len(), "Loaded checkpoints");
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    async fn persist(&self, map: &BTreeMap<String, DateTime<Utc>>) -> Result<(), CapitolWatchError> {
        let io_err = |e: std::io::Error| {
            CapitolWatchError::Checkpoint(format!("{}: {e}", self.path.display()))
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(map)
            .map_err(|e| CapitolWatchError::Checkpoint(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, platform: &str) -> Result<Option<DateTime<Utc>>, CapitolWatchError> {
        Ok(self.cache.lock().await.get(platform).copied())
    }

    async fn advance(
        &self,
        platform: &str,
        ts: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CapitolWatchError> {
        let mut map = self.cache.lock().await;
        let mut next = map.clone();
        let (effective, changed) = advance_in(&mut next, platform, ts);
        if changed {
            // The cache only takes the new value once it is on disk.
            self.persist(&next).await?;
            *map = next;
        }
        Ok(effective)
    }
}
