//! Repository backend trait definitions

use async_trait::async_trait;
use meshvault_core::{MeshvaultResult, ModelIndex, ModelMetadata};
use std::path::Path;

/// Storage behind a model repository.
///
/// Paths are repository-relative and `/`-separated. Versions live under
/// `{model_id}/{version}/` next to their metadata side-file.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    /// Load the catalog; a repository without one yields an empty index
    async fn load_index(&self) -> MeshvaultResult<ModelIndex>;

    /// Persist the whole catalog
    async fn save_index(&self, index: &ModelIndex) -> MeshvaultResult<()>;

    /// Load the metadata of one version
    async fn load_metadata(&self, model_id: &str, version: &str) -> MeshvaultResult<ModelMetadata>;

    /// Persist the metadata of one version
    async fn save_metadata(
        &self,
        model_id: &str,
        version: &str,
        metadata: &ModelMetadata,
    ) -> MeshvaultResult<()>;

    /// List every file below `prefix`, recursively
    async fn list_files(&self, prefix: &str) -> MeshvaultResult<Vec<String>>;

    /// Create a directory and its parents
    async fn ensure_directory(&self, path: &str) -> MeshvaultResult<()>;

    /// Copy a repository file to a local path
    async fn download_file(&self, repo_path: &str, local_path: &Path) -> MeshvaultResult<()>;

    /// Copy a local file into the repository
    async fn upload_file(&self, repo_path: &str, local_path: &Path) -> MeshvaultResult<()>;

    /// Remove a file or directory tree if present
    async fn delete_if_exists(&self, path: &str) -> MeshvaultResult<()>;

    /// Get the backend name
    fn name(&self) -> &'static str;
}
