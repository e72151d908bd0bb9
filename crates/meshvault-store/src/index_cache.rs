//! In-memory cache of the repository index

use chrono::Utc;
use meshvault_backend::RepositoryBackend;
use meshvault_core::layout::{self, METADATA_FILE_NAME};
use meshvault_core::{
    sort_versions_descending, IndexEntry, MeshvaultError, MeshvaultResult, ModelIndex,
    ModelMetadata,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Lazily loaded, write-through cache of the model index.
///
/// The cached copy is authoritative between an explicit refresh and the next
/// publish. Every check-load-replace sequence runs under one mutex, so a miss
/// hit by several callers loads the index once.
pub struct IndexCache {
    backend: Arc<dyn RepositoryBackend>,
    slot: Mutex<Option<Arc<ModelIndex>>>,
}

impl IndexCache {
    /// Create an empty cache over a backend
    pub fn new(backend: Arc<dyn RepositoryBackend>) -> Self {
        Self {
            backend,
            slot: Mutex::new(None),
        }
    }

    /// Cached index, loading it on a miss
    pub async fn get(&self) -> MeshvaultResult<Arc<ModelIndex>> {
        let mut slot = self.slot.lock().await;
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(self.backend.load_index().await?);
        debug!(models = index.len(), "Loaded index");
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Reload from the backend and replace the cached copy
    pub async fn refresh(&self) -> MeshvaultResult<Arc<ModelIndex>> {
        let mut slot = self.slot.lock().await;
        let index = Arc::new(self.backend.load_index().await?);
        info!(models = index.len(), "Refreshed index");
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Drop the cached copy; the next `get` reloads
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
        debug!("Invalidated index cache");
    }

    /// Whether an index is currently cached
    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Single entry lookup
    pub async fn entry(&self, model_id: &str) -> MeshvaultResult<Option<IndexEntry>> {
        Ok(self.get().await?.get(model_id).cloned())
    }

    /// Entries visible to a caller holding `labels`
    pub async fn visible_entries(&self, labels: &[String]) -> MeshvaultResult<Vec<IndexEntry>> {
        let index = self.get().await?;
        Ok(index.visible_entries(labels).cloned().collect())
    }

    /// Fold a published version into the index, persist it and cache the result
    pub async fn update_entry(&self, metadata: &ModelMetadata) -> MeshvaultResult<IndexEntry> {
        if !metadata.identity.has_id() {
            return Err(MeshvaultError::InvalidArgument(
                "cannot index metadata without a model id".to_string(),
            ));
        }

        let mut slot = self.slot.lock().await;
        let mut index = match slot.as_ref() {
            Some(index) => ModelIndex::clone(index),
            None => self.backend.load_index().await?,
        };

        let previous = index
            .get(metadata.id())
            .map(|e| e.latest_version.clone())
            .unwrap_or_default();
        let entry = index.upsert(metadata, Utc::now())?.clone();

        self.backend.save_index(&index).await?;
        *slot = Some(Arc::new(index));

        info!(
            model_id = %entry.id,
            version = %metadata.version,
            previous = %previous,
            latest = %entry.latest_version,
            "Updated index entry"
        );
        Ok(entry)
    }

    /// All versions of a model, newest first.
    ///
    /// Merges the versions recorded in the index with the version folders found
    /// in the backend. Falls back to the entry's latest version when neither
    /// source knows any.
    pub async fn list_versions(&self, model_id: &str) -> MeshvaultResult<Vec<String>> {
        layout::validate_segment("model id", model_id)?;

        let entry = self.get().await?.get(model_id).cloned();
        let mut versions: BTreeSet<String> = entry
            .as_ref()
            .map(|e| e.versions.iter().cloned().collect())
            .unwrap_or_default();

        for path in self.backend.list_files(model_id).await? {
            let Some(relative) = layout::strip_root(model_id, &path) else {
                continue;
            };
            // only folders holding a metadata side-file are versions
            if let Some((version, METADATA_FILE_NAME)) = relative.split_once('/') {
                versions.insert(version.to_string());
            }
        }

        let mut versions: Vec<String> = versions.into_iter().collect();
        if versions.is_empty() {
            if let Some(latest) = entry.map(|e| e.latest_version).filter(|v| !v.is_empty()) {
                versions.push(latest);
            }
        }

        sort_versions_descending(&mut versions);
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_backend::FsBackend;
    use meshvault_core::ModelIdentity;
    use tempfile::TempDir;

    fn cache() -> (TempDir, Arc<FsBackend>, IndexCache) {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FsBackend::new(dir.path()));
        let cache = IndexCache::new(backend.clone());
        (dir, backend, cache)
    }

    fn meta(version: &str) -> ModelMetadata {
        ModelMetadata::new(ModelIdentity::new("chair", "Chair"), version)
    }

    #[tokio::test]
    async fn test_lazy_load_and_invalidate() {
        let (_dir, backend, cache) = cache();
        assert!(!cache.is_loaded().await);
        assert!(cache.get().await.unwrap().is_empty());
        assert!(cache.is_loaded().await);

        // written behind the cache's back
        let mut index = ModelIndex::new();
        index.upsert(&meta("1.0.0"), Utc::now()).unwrap();
        backend.save_index(&index).await.unwrap();

        assert!(cache.get().await.unwrap().is_empty());
        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces() {
        let (_dir, backend, cache) = cache();
        cache.get().await.unwrap();

        let mut index = ModelIndex::new();
        index.upsert(&meta("1.0.0"), Utc::now()).unwrap();
        backend.save_index(&index).await.unwrap();

        let refreshed = cache.refresh().await.unwrap();
        assert_eq!(refreshed.len(), 1);
    }

    #[tokio::test]
    async fn test_update_entry_is_write_through() {
        let (_dir, backend, cache) = cache();

        cache.update_entry(&meta("1.0.0")).await.unwrap();
        let entry = cache.update_entry(&meta("0.9.0")).await.unwrap();
        assert_eq!(entry.latest_version, "1.0.0");

        let cached = cache.entry("chair").await.unwrap().unwrap();
        assert_eq!(cached.latest_version, "1.0.0");

        let persisted = backend.load_index().await.unwrap();
        assert_eq!(persisted.get("chair").unwrap().latest_version, "1.0.0");
    }

    #[tokio::test]
    async fn test_update_entry_requires_id() {
        let (_dir, _backend, cache) = cache();
        let err = cache
            .update_entry(&ModelMetadata::new(ModelIdentity::default(), "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshvaultError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_list_versions_merges_backend_folders() {
        let (_dir, backend, cache) = cache();
        cache.update_entry(&meta("1.0.0")).await.unwrap();

        backend.save_metadata("chair", "1.2.0", &meta("1.2.0")).await.unwrap();
        backend.save_metadata("chair", "legacy", &meta("legacy")).await.unwrap();
        backend.save_metadata("chair", "1.10.0", &meta("1.10.0")).await.unwrap();

        let versions = cache.list_versions("chair").await.unwrap();
        assert_eq!(versions, vec!["1.10.0", "1.2.0", "1.0.0", "legacy"]);
    }

    #[tokio::test]
    async fn test_list_versions_falls_back_to_latest() {
        let (_dir, backend, cache) = cache();
        let mut index = ModelIndex::new();
        let mut entry = IndexEntry::new("table");
        entry.latest_version = "2.1.0".to_string();
        index.entries.insert("table".to_string(), entry);
        backend.save_index(&index).await.unwrap();

        assert_eq!(cache.list_versions("table").await.unwrap(), vec!["2.1.0"]);
        assert!(cache.list_versions("missing").await.unwrap().is_empty());
    }
}
