//! Local download cache
//!
//! Mirrors repository versions into `{cache_root}/{model_id}/{version}/`
//! with a copy of the metadata side-file for fast re-reads.

use meshvault_backend::RepositoryBackend;
use meshvault_core::layout::{self, METADATA_FILE_NAME};
use meshvault_core::{MeshvaultError, MeshvaultResult, ModelMetadata};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A version materialized in the local cache
#[derive(Debug, Clone)]
pub struct DownloadedVersion {
    /// Local folder holding the version
    pub root: PathBuf,
    /// Metadata of the version
    pub metadata: ModelMetadata,
    /// Version-relative paths of the downloaded payload files
    pub files: Vec<String>,
}

/// Local model cache synchronized from a repository
pub struct LocalCache {
    /// Base path for cached versions
    root: PathBuf,
    backend: Arc<dyn RepositoryBackend>,
}

impl LocalCache {
    /// Create a new local cache
    pub fn new(root: impl Into<PathBuf>, backend: Arc<dyn RepositoryBackend>) -> Self {
        Self {
            root: root.into(),
            backend,
        }
    }

    /// Initialize the cache directory
    pub async fn init(&self) -> MeshvaultResult<()> {
        if !tokio::fs::try_exists(&self.root).await? {
            tokio::fs::create_dir_all(&self.root).await?;
            info!(path = %self.root.display(), "Created model cache directory");
        }
        Ok(())
    }

    /// Cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic local folder of a version
    pub fn version_dir(&self, model_id: &str, version: &str) -> MeshvaultResult<PathBuf> {
        layout::validate_segment("model id", model_id)?;
        layout::validate_segment("version", version)?;
        Ok(self.root.join(model_id).join(version))
    }

    /// Download every file of a version into the cache.
    ///
    /// Individual file failures do not stop the remaining transfers, but the
    /// call fails with `IncompleteDownload` if any file is missing afterwards.
    /// The metadata side-file is only written once every file is present.
    /// Re-downloading a cached version overwrites it with the same content.
    pub async fn download_version(
        &self,
        model_id: &str,
        version: &str,
    ) -> MeshvaultResult<DownloadedVersion> {
        let repo_root = layout::version_root(model_id, version)?;
        let local_root = self.version_dir(model_id, version)?;

        info!(model_id = model_id, version = version, "Downloading version");

        let metadata = self.backend.load_metadata(model_id, version).await?;
        tokio::fs::create_dir_all(&local_root).await?;

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let mut failed = Vec::new();

        for path in self.backend.list_files(&repo_root).await? {
            let Some(relative) = layout::strip_root(&repo_root, &path) else {
                continue;
            };
            if layout::is_metadata_file(relative) || !seen.insert(relative.to_string()) {
                continue;
            }

            let local = local_root.join(relative);
            match self.backend.download_file(&path, &local).await {
                Ok(()) => {
                    debug!(file = relative, "Cached file");
                    files.push(relative.to_string());
                }
                Err(e) => {
                    warn!(file = %path, error = %e, "Failed to download file");
                    failed.push(path.clone());
                }
            }
        }

        if !failed.is_empty() {
            // The side-file marks a complete version; drop one left by an earlier download
            let side_file = local_root.join(METADATA_FILE_NAME);
            match tokio::fs::remove_file(&side_file).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %side_file.display(), error = %e, "Failed to remove stale metadata"),
            }
            return Err(MeshvaultError::IncompleteDownload {
                version_root: repo_root,
                failed,
            });
        }

        write_metadata(&local_root, &metadata).await?;

        info!(
            model_id = model_id,
            version = version,
            files = files.len(),
            path = %local_root.display(),
            "Version cached"
        );

        Ok(DownloadedVersion {
            root: local_root,
            metadata,
            files,
        })
    }

    /// Metadata of a cached version, read from the local side-file
    pub async fn cached_metadata(
        &self,
        model_id: &str,
        version: &str,
    ) -> MeshvaultResult<Option<ModelMetadata>> {
        let path = self.version_dir(model_id, version)?.join(METADATA_FILE_NAME);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a version is cached
    pub async fn is_cached(&self, model_id: &str, version: &str) -> bool {
        matches!(self.cached_metadata(model_id, version).await, Ok(Some(_)))
    }

    /// Remove a version from the cache
    pub async fn remove_version(&self, model_id: &str, version: &str) -> MeshvaultResult<()> {
        let dir = self.version_dir(model_id, version)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(model_id = model_id, version = version, "Removed version from cache");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_metadata(dir: &Path, metadata: &ModelMetadata) -> MeshvaultResult<()> {
    let serialized = serde_json::to_vec_pretty(metadata)?;
    tokio::fs::write(dir.join(METADATA_FILE_NAME), serialized).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_backend::FsBackend;
    use meshvault_core::ModelIdentity;
    use tempfile::TempDir;

    async fn seeded() -> (TempDir, Arc<FsBackend>, LocalCache) {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FsBackend::new(dir.path().join("repo")));

        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();
        backend.upload_file("chair/1.0.0/a.mesh", &src).await.unwrap();
        backend.upload_file("chair/1.0.0/tex/b.tex", &src).await.unwrap();
        let meta = ModelMetadata::new(ModelIdentity::new("chair", "Chair"), "1.0.0");
        backend.save_metadata("chair", "1.0.0", &meta).await.unwrap();

        let cache = LocalCache::new(dir.path().join("cache"), backend.clone());
        cache.init().await.unwrap();
        (dir, backend, cache)
    }

    #[tokio::test]
    async fn test_download_version() {
        let (dir, _backend, cache) = seeded().await;

        let downloaded = cache.download_version("chair", "1.0.0").await.unwrap();
        assert_eq!(downloaded.root, dir.path().join("cache/chair/1.0.0"));
        assert_eq!(downloaded.files, vec!["a.mesh", "tex/b.tex"]);
        assert_eq!(
            tokio::fs::read(downloaded.root.join("tex/b.tex")).await.unwrap(),
            b"payload"
        );

        let cached = cache.cached_metadata("chair", "1.0.0").await.unwrap().unwrap();
        assert_eq!(cached, downloaded.metadata);
        assert!(cache.is_cached("chair", "1.0.0").await);
    }

    #[tokio::test]
    async fn test_download_is_idempotent() {
        let (_dir, _backend, cache) = seeded().await;
        let first = cache.download_version("chair", "1.0.0").await.unwrap();
        let second = cache.download_version("chair", "1.0.0").await.unwrap();
        assert_eq!(first.files, second.files);
    }

    #[tokio::test]
    async fn test_missing_version() {
        let (_dir, _backend, cache) = seeded().await;
        let err = cache.download_version("chair", "9.9.9").await.unwrap_err();
        assert!(matches!(err, MeshvaultError::NotFound(_)));
        assert!(!cache.is_cached("chair", "9.9.9").await);
    }

    #[tokio::test]
    async fn test_remove_version() {
        let (_dir, _backend, cache) = seeded().await;
        cache.download_version("chair", "1.0.0").await.unwrap();
        cache.remove_version("chair", "1.0.0").await.unwrap();
        assert!(!cache.is_cached("chair", "1.0.0").await);
        cache.remove_version("chair", "1.0.0").await.unwrap();
    }

    struct FlakyDownloads {
        inner: Arc<FsBackend>,
        fail_on: &'static str,
    }

    #[async_trait::async_trait]
    impl RepositoryBackend for FlakyDownloads {
        async fn load_index(&self) -> MeshvaultResult<meshvault_core::ModelIndex> {
            self.inner.load_index().await
        }
        async fn save_index(&self, index: &meshvault_core::ModelIndex) -> MeshvaultResult<()> {
            self.inner.save_index(index).await
        }
        async fn load_metadata(&self, id: &str, version: &str) -> MeshvaultResult<ModelMetadata> {
            self.inner.load_metadata(id, version).await
        }
        async fn save_metadata(
            &self,
            id: &str,
            version: &str,
            metadata: &ModelMetadata,
        ) -> MeshvaultResult<()> {
            self.inner.save_metadata(id, version, metadata).await
        }
        async fn list_files(&self, prefix: &str) -> MeshvaultResult<Vec<String>> {
            self.inner.list_files(prefix).await
        }
        async fn ensure_directory(&self, path: &str) -> MeshvaultResult<()> {
            self.inner.ensure_directory(path).await
        }
        async fn download_file(&self, repo_path: &str, local: &Path) -> MeshvaultResult<()> {
            if repo_path.ends_with(self.fail_on) {
                return Err(MeshvaultError::Io(std::io::Error::new(
                    ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            }
            self.inner.download_file(repo_path, local).await
        }
        async fn upload_file(&self, repo_path: &str, local: &Path) -> MeshvaultResult<()> {
            self.inner.upload_file(repo_path, local).await
        }
        async fn delete_if_exists(&self, path: &str) -> MeshvaultResult<()> {
            self.inner.delete_if_exists(path).await
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_failed_file_does_not_stop_others() {
        let (dir, backend, _cache) = seeded().await;
        backend.upload_file("chair/1.0.0/c.mesh", &dir.path().join("src.bin")).await.unwrap();
        let flaky = Arc::new(FlakyDownloads {
            inner: backend,
            fail_on: "b.tex",
        });
        let cache = LocalCache::new(dir.path().join("cache"), flaky);

        let err = cache.download_version("chair", "1.0.0").await.unwrap_err();
        match err {
            MeshvaultError::IncompleteDownload { version_root, failed } => {
                assert_eq!(version_root, "chair/1.0.0");
                assert_eq!(failed, vec!["chair/1.0.0/tex/b.tex"]);
            }
            other => panic!("unexpected error: {}", other),
        }

        let local = dir.path().join("cache/chair/1.0.0");
        assert!(local.join("a.mesh").exists());
        assert!(local.join("c.mesh").exists());
        assert!(!local.join("tex/b.tex").exists());
        assert!(!cache.is_cached("chair", "1.0.0").await);
        assert!(cache.cached_metadata("chair", "1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_redownload_clears_cached_marker() {
        let (dir, backend, cache) = seeded().await;
        cache.download_version("chair", "1.0.0").await.unwrap();
        assert!(cache.is_cached("chair", "1.0.0").await);

        let flaky = LocalCache::new(
            dir.path().join("cache"),
            Arc::new(FlakyDownloads {
                inner: backend,
                fail_on: "a.mesh",
            }),
        );
        assert!(flaky.download_version("chair", "1.0.0").await.is_err());
        assert!(!flaky.is_cached("chair", "1.0.0").await);
    }

    #[test]
    fn test_version_dir() {
        let backend = Arc::new(FsBackend::new("/srv/repo"));
        let cache = LocalCache::new("/var/cache/meshvault", backend);
        assert_eq!(
            cache.version_dir("chair", "1.0.0").unwrap(),
            PathBuf::from("/var/cache/meshvault/chair/1.0.0")
        );
        assert!(cache.version_dir("../x", "1.0.0").is_err());
    }
}
