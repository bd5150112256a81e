// Boundary to the persisted record store.
//
// The ingestion core only ever calls these operations. Row-level atomicity of
// `upsert` (keyed by natural key) is the store's job; coordinators do not lock
// around it.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use capitolwatch_common::{
    AnalysisArtifact, AnalysisSourceType, CanonicalEntity, EntityKind, NaturalKey, Signal,
    StoreError,
};

pub use memory::MemoryStore;

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// The key carries its entity kind, so no separate kind argument is needed.
    async fn find_by_natural_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<CanonicalEntity>, StoreError>;

    /// Insert or replace the entity stored under its natural key. Returns the
    /// entity as stored.
    async fn upsert(&self, entity: CanonicalEntity) -> Result<CanonicalEntity, StoreError>;

    /// Record that `source_id` saw the stored entity unchanged at `at`.
    /// Mapped fields are never touched. A missing row is not an error.
    async fn touch_synced(
        &self,
        key: &NaturalKey,
        source_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<CanonicalEntity>, StoreError>;

    /// Append-only.
    async fn insert_signal(&self, signal: Signal) -> Result<(), StoreError>;

    /// Append-only. Artifacts are never overwritten.
    async fn insert_artifact(&self, artifact: AnalysisArtifact) -> Result<(), StoreError>;

    /// Most recent artifact for one source, used for change detection.
    async fn latest_artifact(
        &self,
        source_type: AnalysisSourceType,
        source_id: &str,
    ) -> Result<Option<AnalysisArtifact>, StoreError>;
}
