use std::collections::BTreeMap;

use tokio::sync::RwLock;
use tracing::info;

use capitolwatch_common::{CapitolWatchError, Layer, SourceDescriptor, SourceStatus};

/// All source descriptors known to the process. Descriptors are registered at
/// startup and never removed. Each coordinator only mutates the descriptors of
/// its own layer.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<BTreeMap<String, SourceDescriptor>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, source: SourceDescriptor) {
        info!(
            source = source.id.as_str(),
            layer = %source.layer,
            status = %source.status,
            "Registered source"
        );
        self.sources.write().await.insert(source.id.clone(), source);
    }

    pub async fn get(&self, id: &str) -> Option<SourceDescriptor> {
        self.sources.read().await.get(id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<SourceDescriptor> {
        self.sources.read().await.values().cloned().collect()
    }

    pub async fn for_layer(&self, layer: Layer) -> Vec<SourceDescriptor> {
        self.sources
            .read()
            .await
            .values()
            .filter(|s| s.layer == layer)
            .cloned()
            .collect()
    }

    /// Apply `f` to one descriptor and return the updated copy.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<SourceDescriptor, CapitolWatchError>
    where
        F: FnOnce(&mut SourceDescriptor),
    {
        let mut sources = self.sources.write().await;
        let source = sources
            .get_mut(id)
            .ok_or_else(|| CapitolWatchError::UnknownSource(id.to_string()))?;
        f(source);
        Ok(source.clone())
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: SourceStatus,
    ) -> Result<SourceDescriptor, CapitolWatchError> {
        self.update(id, |s| s.status = status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_unknown_source_errors() {
        let registry = SourceRegistry::new();
        let err = registry
            .set_status("missing", SourceStatus::Paused)
            .await
            .unwrap_err();
        assert!(matches!(err, CapitolWatchError::UnknownSource(id) if id == "missing"));
    }

    #[tokio::test]
    async fn layer_filter_and_updates() {
        let registry = SourceRegistry::new();
        registry
            .register(SourceDescriptor::new("bills", "Bills", Layer::Foundation))
            .await;
        registry
            .register(SourceDescriptor::new("news", "News", Layer::Speed))
            .await;

        assert_eq!(registry.for_layer(Layer::Speed).await.len(), 1);
        let paused = registry.set_status("news", SourceStatus::Paused).await.unwrap();
        assert_eq!(paused.status, SourceStatus::Paused);
        assert_eq!(
            registry.get("news").await.unwrap().status,
            SourceStatus::Paused
        );
    }
}
