//! File-system repository backend
//!
//! Stores the repository as a plain directory tree. Used for local and
//! network-mounted repositories, and as the reference backend in tests.

use async_trait::async_trait;
use meshvault_core::layout::{self, INDEX_FILE_NAME, METADATA_FILE_NAME};
use meshvault_core::{MeshvaultError, MeshvaultResult, ModelIndex, ModelMetadata};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::traits::RepositoryBackend;

/// Directory-backed repository
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Create a backend rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed
    pub async fn init(&self) -> MeshvaultResult<()> {
        if !tokio::fs::try_exists(&self.root).await? {
            tokio::fs::create_dir_all(&self.root).await?;
            info!(path = %self.root.display(), "Created repository directory");
        }
        Ok(())
    }

    /// Repository root on disk
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a repository path onto the local file system
    fn resolve(&self, repo_path: &str) -> MeshvaultResult<PathBuf> {
        layout::validate_repo_path(repo_path)?;
        let mut path = self.root.clone();
        for segment in repo_path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            path.push(segment);
        }
        Ok(path)
    }

    fn metadata_path(&self, model_id: &str, version: &str) -> MeshvaultResult<PathBuf> {
        let root = layout::version_root(model_id, version)?;
        self.resolve(&layout::join(&root, METADATA_FILE_NAME))
    }
}

/// Write JSON through a temp file and rename it into place
async fn write_json<T: Serialize>(path: &Path, value: &T) -> MeshvaultResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let serialized = serde_json::to_vec_pretty(value)?;
    let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
    tokio::fs::write(&temp_path, &serialized).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
            warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temp file");
        }
        return Err(e.into());
    }
    Ok(())
}

fn not_found_or_io(err: std::io::Error, what: impl FnOnce() -> String) -> MeshvaultError {
    if err.kind() == ErrorKind::NotFound {
        MeshvaultError::NotFound(what())
    } else {
        MeshvaultError::Io(err)
    }
}

#[async_trait]
impl RepositoryBackend for FsBackend {
    async fn load_index(&self) -> MeshvaultResult<ModelIndex> {
        let path = self.resolve(INDEX_FILE_NAME)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No index yet, starting empty");
                Ok(ModelIndex::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_index(&self, index: &ModelIndex) -> MeshvaultResult<()> {
        let path = self.resolve(INDEX_FILE_NAME)?;
        write_json(&path, index).await?;
        debug!(models = index.len(), "Saved index");
        Ok(())
    }

    async fn load_metadata(&self, model_id: &str, version: &str) -> MeshvaultResult<ModelMetadata> {
        let path = self.metadata_path(model_id, version)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_or_io(e, || format!("metadata for {}@{}", model_id, version)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save_metadata(
        &self,
        model_id: &str,
        version: &str,
        metadata: &ModelMetadata,
    ) -> MeshvaultResult<()> {
        let path = self.metadata_path(model_id, version)?;
        write_json(&path, metadata).await
    }

    async fn list_files(&self, prefix: &str) -> MeshvaultResult<Vec<String>> {
        let start = self.resolve(prefix)?;
        let mut files = Vec::new();

        let start_meta = match tokio::fs::metadata(&start).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        if start_meta.is_file() {
            files.push(prefix.trim_matches('/').to_string());
            return Ok(files);
        }

        let mut pending = vec![(start, prefix.trim_matches('/').to_string())];
        while let Some((dir, repo_dir)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let repo_path = layout::join(&repo_dir, &name);
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), repo_path));
                } else {
                    files.push(repo_path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn ensure_directory(&self, path: &str) -> MeshvaultResult<()> {
        let dir = self.resolve(path)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn download_file(&self, repo_path: &str, local_path: &Path) -> MeshvaultResult<()> {
        let source = self.resolve(repo_path)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, local_path)
            .await
            .map_err(|e| not_found_or_io(e, || repo_path.to_string()))?;
        debug!(repo_path = repo_path, local = %local_path.display(), "Downloaded file");
        Ok(())
    }

    async fn upload_file(&self, repo_path: &str, local_path: &Path) -> MeshvaultResult<()> {
        let target = self.resolve(repo_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &target).await?;
        debug!(repo_path = repo_path, local = %local_path.display(), "Uploaded file");
        Ok(())
    }

    async fn delete_if_exists(&self, path: &str) -> MeshvaultResult<()> {
        let target = self.resolve(path)?;
        let meta = match tokio::fs::symlink_metadata(&target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        info!(path = path, "Deleted repository path");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}
