use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use capitolwatch_common::{
    AnalysisArtifact, AnalysisSourceType, CanonicalEntity, EntityKind, NaturalKey, Signal,
    StoreError,
};

use super::EntityStore;

/// In-process store. One write lock per operation gives row-level atomicity.
///
/// Cross-source ordering is last-write-wins on `updated_at`: an incoming
/// entity older than the stored row is rejected with `WriteConflict`.
/// `last_synced_at` is merged so no source's timestamp ever regresses.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<NaturalKey, CanonicalEntity>>,
    signals: RwLock<Vec<Signal>>,
    artifacts: RwLock<Vec<AnalysisArtifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list_signals(&self) -> Vec<Signal> {
        self.signals.read().await.clone()
    }

    pub async fn list_artifacts(&self) -> Vec<AnalysisArtifact> {
        self.artifacts.read().await.clone()
    }

    pub async fn entity_count(&self) -> usize {
        self.entities.read().await.len()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_natural_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<CanonicalEntity>, StoreError> {
        Ok(self.entities.read().await.get(key).cloned())
    }

    async fn upsert(&self, mut entity: CanonicalEntity) -> Result<CanonicalEntity, StoreError> {
        let key = entity.natural_key();
        if !key.is_complete() {
            return Err(StoreError::WriteConflict(format!(
                "refusing to store incomplete key {key}"
            )));
        }

        let mut entities = self.entities.write().await;
        if let Some(existing) = entities.get(&key) {
            if entity.updated_at() < existing.updated_at() {
                return Err(StoreError::WriteConflict(format!(
                    "{key}: incoming updated_at {} is older than stored {}",
                    entity.updated_at().to_rfc3339(),
                    existing.updated_at().to_rfc3339()
                )));
            }
            entity.merge_synced(existing.last_synced_at());
        }
        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn touch_synced(
        &self,
        key: &NaturalKey,
        source_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(entity) = self.entities.write().await.get_mut(key) {
            entity.mark_synced(source_id, at);
        }
        Ok(())
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<CanonicalEntity>, StoreError> {
        let entities = self.entities.read().await;
        let mut out: Vec<CanonicalEntity> = entities
            .values()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.natural_key());
        Ok(out)
    }

    async fn insert_signal(&self, signal: Signal) -> Result<(), StoreError> {
        self.signals.write().await.push(signal);
        Ok(())
    }

    async fn insert_artifact(&self, artifact: AnalysisArtifact) -> Result<(), StoreError> {
        self.artifacts.write().await.push(artifact);
        Ok(())
    }

    async fn latest_artifact(
        &self,
        source_type: AnalysisSourceType,
        source_id: &str,
    ) -> Result<Option<AnalysisArtifact>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts
            .iter()
            .rev()
            .find(|a| a.source_type == source_type && a.source_id == source_id)
            .cloned())
    }
}
