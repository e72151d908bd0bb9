//! Version publishing
//!
//! A publish runs `validate → write payload → persist metadata → update index`.
//! Validation happens before any side effect, and the index is always updated
//! last so it never advertises a version whose files are incomplete.

use meshvault_backend::RepositoryBackend;
use meshvault_core::layout;
use meshvault_core::{ChangeNote, Clock, MeshvaultError, MeshvaultResult, ModelMetadata, SemVer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index_cache::IndexCache;

/// Default changelog summary for a first submission
pub const INITIAL_SUBMISSION: &str = "Initial submission";

/// Default changelog summary for a metadata-only revision
pub const METADATA_UPDATED: &str = "Metadata updated";

/// How a metadata-only revision derives its version from the base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionBump {
    /// `major.minor.patch+1`
    #[default]
    Patch,
    /// `major.minor+1.0`
    Minor,
    /// `major+1.0.0`
    Major,
    /// Use this exact version
    Exact(SemVer),
}

impl VersionBump {
    /// Compute the new version from the base
    pub fn apply(self, base: SemVer) -> MeshvaultResult<SemVer> {
        match self {
            VersionBump::Patch => base.bump_patch(),
            VersionBump::Minor => base.bump_minor(),
            VersionBump::Major => base.bump_major(),
            VersionBump::Exact(version) => Ok(version),
        }
    }
}

/// Result of a publish
#[derive(Debug, Clone)]
pub struct PublishedVersion {
    /// Repository-relative root: `{model_id}/{version}`
    pub root: String,
    /// Metadata as stored
    pub metadata: ModelMetadata,
}

/// Publishes model versions to a repository
pub struct Publisher {
    backend: Arc<dyn RepositoryBackend>,
    index: Arc<IndexCache>,
    clock: Arc<dyn Clock>,
    default_author: Option<String>,
    staging_dir: Option<PathBuf>,
}

impl Publisher {
    /// Create a publisher
    pub fn new(
        backend: Arc<dyn RepositoryBackend>,
        index: Arc<IndexCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            index,
            clock,
            default_author: None,
            staging_dir: None,
        }
    }

    /// Author recorded when a change note names none
    pub fn with_default_author(mut self, author: impl Into<String>) -> Self {
        self.default_author = Some(author.into());
        self
    }

    /// Parent directory for clone staging areas
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    fn note_with_defaults(&self, note: ChangeNote) -> ChangeNote {
        ChangeNote {
            summary: note.summary,
            author: note.author.or_else(|| self.default_author.clone()),
        }
    }

    /// Publish a new version from a local payload folder
    pub async fn submit_new_version(
        &self,
        mut metadata: ModelMetadata,
        local_root: &Path,
        note: ChangeNote,
    ) -> MeshvaultResult<PublishedVersion> {
        // Validate
        if !metadata.identity.has_id() {
            metadata.identity.id = Uuid::new_v4().to_string();
            debug!(model_id = %metadata.identity.id, "Assigned new model id");
        }
        if metadata.version.trim().is_empty() {
            return Err(MeshvaultError::InvalidArgument(
                "a version is required to submit a model".to_string(),
            ));
        }
        if SemVer::parse(&metadata.version).is_err() {
            warn!(
                model_id = %metadata.identity.id,
                version = %metadata.version,
                "Submitting a version that is not major.minor.patch"
            );
        }
        let root = layout::version_root(metadata.id(), &metadata.version)?;
        let is_dir = tokio::fs::metadata(local_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(MeshvaultError::InvalidArgument(format!(
                "payload root {} is not a directory",
                local_root.display()
            )));
        }

        info!(
            model_id = %metadata.identity.id,
            version = %metadata.version,
            "Submitting new version"
        );

        let now = self.clock.now();
        metadata.created_at.get_or_insert(now);
        metadata.updated_at = Some(now);
        metadata.uploaded_at = Some(now);
        let note = self.note_with_defaults(note);
        metadata.record_note(&note, INITIAL_SUBMISSION, now);

        // Write payload
        self.backend.ensure_directory(&root).await?;
        let files = collect_payload(local_root).await?;
        for relative in &files {
            let repo_path = layout::join(&root, relative);
            self.backend
                .upload_file(&repo_path, &local_root.join(relative))
                .await?;
        }
        metadata.payload_files = files;

        // Persist metadata, then index
        self.backend
            .save_metadata(metadata.id(), &metadata.version, &metadata)
            .await?;
        self.index.update_entry(&metadata).await?;

        info!(
            root = %root,
            files = metadata.payload_files.len(),
            "Version submitted"
        );
        Ok(PublishedVersion { root, metadata })
    }

    /// Publish a metadata-only revision of an existing version.
    ///
    /// The payload of `base_version` is copied unchanged into the new version;
    /// only the metadata differs. `base_version` defaults to `updated.version`.
    pub async fn publish_metadata_update(
        &self,
        mut updated: ModelMetadata,
        base_version: Option<&str>,
        note: ChangeNote,
        bump: VersionBump,
    ) -> MeshvaultResult<PublishedVersion> {
        // Validate
        if !updated.identity.has_id() {
            return Err(MeshvaultError::InvalidArgument(
                "metadata update requires a model id".to_string(),
            ));
        }
        let base_str = base_version
            .map(str::to_string)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| Some(updated.version.clone()).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                MeshvaultError::InvalidOperation(
                    "no base version to derive the update from".to_string(),
                )
            })?;
        let base = SemVer::parse(&base_str).map_err(|e| {
            MeshvaultError::InvalidOperation(format!("base version is not usable: {}", e))
        })?;
        let new_version = bump.apply(base)?.to_string();

        let model_id = updated.identity.id.clone();
        let base_root = layout::version_root(&model_id, &base_str)?;
        let new_root = layout::version_root(&model_id, &new_version)?;

        if base_str != new_version && !self.backend.list_files(&new_root).await?.is_empty() {
            return Err(MeshvaultError::InvalidOperation(format!(
                "version {} already exists",
                new_root
            )));
        }

        info!(
            model_id = %model_id,
            base = %base_str,
            version = %new_version,
            "Publishing metadata update"
        );

        // History of the base version is carried forward
        match self.backend.load_metadata(&model_id, &base_str).await {
            Ok(base_meta) => updated.carry_history(&base_meta.changelog),
            Err(MeshvaultError::NotFound(_)) => {
                warn!(model_id = %model_id, base = %base_str, "Base version has no metadata")
            }
            Err(e) => return Err(e),
        }

        let now = self.clock.now();
        updated.version = new_version.clone();
        updated.created_at.get_or_insert(now);
        updated.updated_at = Some(now);
        updated.uploaded_at = Some(now);
        let note = self.note_with_defaults(note);
        updated.record_note(&note, METADATA_UPDATED, now);

        // Clone payload
        if base_str != new_version {
            match self.clone_payload(&base_root, &new_root).await {
                Ok(files) => updated.payload_files = files,
                Err(e) => {
                    self.discard_partial(&new_root).await;
                    return Err(e);
                }
            }
        } else {
            debug!(root = %base_root, "Base and new version match, skipping clone");
        }

        // Persist metadata, then index
        if let Err(e) = self
            .backend
            .save_metadata(&model_id, &new_version, &updated)
            .await
        {
            if base_str != new_version {
                self.discard_partial(&new_root).await;
            }
            return Err(e);
        }
        self.index.update_entry(&updated).await?;

        info!(root = %new_root, "Metadata update published");
        Ok(PublishedVersion {
            root: new_root,
            metadata: updated,
        })
    }

    /// Copy every payload file from one version root to another through a
    /// local staging directory. Returns the copied version-relative paths.
    async fn clone_payload(&self, base_root: &str, new_root: &str) -> MeshvaultResult<Vec<String>> {
        let staging = match &self.staging_dir {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await?;
                tempfile::Builder::new()
                    .prefix("meshvault-clone-")
                    .tempdir_in(parent)?
            }
            None => tempfile::Builder::new().prefix("meshvault-clone-").tempdir()?,
        };

        let result = self.copy_through(&staging, base_root, new_root).await;

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!(
                path = %staging_path.display(),
                error = %e,
                "Failed to remove clone staging directory"
            );
        }

        result.map_err(|e| match e {
            MeshvaultError::Io(_) | MeshvaultError::Backend(_) => e,
            other => MeshvaultError::Backend(format!(
                "cloning {} to {} failed: {}",
                base_root, new_root, other
            )),
        })
    }

    async fn copy_through(
        &self,
        staging: &TempDir,
        base_root: &str,
        new_root: &str,
    ) -> MeshvaultResult<Vec<String>> {
        self.backend.ensure_directory(new_root).await?;

        let mut copied = Vec::new();
        for path in self.backend.list_files(base_root).await? {
            let Some(relative) = layout::strip_root(base_root, &path) else {
                continue;
            };
            if layout::is_metadata_file(relative) {
                continue;
            }

            let local = staging.path().join(relative);
            self.backend.download_file(&path, &local).await?;
            self.backend
                .upload_file(&layout::join(new_root, relative), &local)
                .await?;
            debug!(file = relative, "Cloned payload file");
            copied.push(relative.to_string());
        }

        Ok(copied)
    }

    /// Best-effort removal of a partially written version
    async fn discard_partial(&self, root: &str) {
        if let Err(e) = self.backend.delete_if_exists(root).await {
            warn!(root = %root, error = %e, "Failed to remove partial version");
        }
    }
}

/// Version-relative paths of every payload file under `root`, sorted.
/// The metadata side-file at the root is skipped.
async fn collect_payload(root: &Path) -> MeshvaultResult<Vec<String>> {
    let root = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || -> MeshvaultResult<Vec<String>> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&root).follow_links(true) {
            let entry = entry.map_err(|e| {
                MeshvaultError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let relative = relative.join("/");
            if layout::is_metadata_file(&relative) {
                continue;
            }
            files.push(relative);
        }
        files.sort();
        Ok(files)
    })
    .await
    .map_err(|e| MeshvaultError::Backend(format!("payload scan task failed: {}", e)))??;

    Ok(files)
}
