//! Materializes cached versions into the workspace

use meshvault_core::{Clock, MeshvaultError, MeshvaultResult};
use meshvault_store::DownloadedVersion;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conflict::{classify, AssetRegistry, ConflictPolicy, ConflictReport, Resolution};
use crate::record::InstallRecord;

/// Result of an install
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// Folder the version was installed into
    pub folder: PathBuf,
    /// Record written into the folder
    pub record: InstallRecord,
    /// Identifier check result; `None` for an update in place
    pub report: Option<ConflictReport>,
    /// Resolution applied to cross-model matches, if any
    pub resolution: Option<Resolution>,
}

/// Installs downloaded versions into `{workspace}/{install_dir}/{model}`
pub struct Installer {
    install_root: PathBuf,
    registry: Arc<dyn AssetRegistry>,
    policy: Arc<dyn ConflictPolicy>,
    clock: Arc<dyn Clock>,
}

impl Installer {
    /// Create an installer
    pub fn new(
        install_root: impl Into<PathBuf>,
        registry: Arc<dyn AssetRegistry>,
        policy: Arc<dyn ConflictPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            registry,
            policy,
            clock,
        }
    }

    /// Folder a model is installed into.
    ///
    /// Uses the display name when it is usable as a folder and not taken by
    /// another model, the model id otherwise.
    pub async fn destination_for(&self, model_id: &str, name: &str) -> MeshvaultResult<PathBuf> {
        let by_id = self.install_root.join(model_id);
        let Some(folder) = folder_name(name) else {
            return Ok(by_id);
        };

        let by_name = self.install_root.join(folder);
        match InstallRecord::read(&by_name).await? {
            Some(existing) if existing.model_id != model_id => Ok(by_id),
            _ => Ok(by_name),
        }
    }

    /// Install a cached version into the workspace
    pub async fn install(&self, downloaded: &DownloadedVersion) -> MeshvaultResult<InstallOutcome> {
        let metadata = &downloaded.metadata;
        let model_id = metadata.id();
        if model_id.is_empty() {
            return Err(MeshvaultError::InvalidArgument(
                "downloaded metadata has no model id".to_string(),
            ));
        }

        let destination = self
            .destination_for(model_id, &metadata.identity.name)
            .await?;
        let previous = InstallRecord::read(&destination).await?;
        let update_in_place = previous
            .as_ref()
            .map_or(false, |p| p.model_id == model_id);

        // Snapshot before any file of this version lands in the workspace
        let snapshot = if update_in_place {
            None
        } else {
            Some(self.registry.snapshot().await?)
        };

        info!(
            model_id = model_id,
            version = %metadata.version,
            destination = %destination.display(),
            update_in_place = update_in_place,
            "Installing version"
        );

        // Files land in a staging folder first; the destination is untouched
        // until the copy and the conflict decision have both succeeded
        tokio::fs::create_dir_all(&self.install_root).await?;
        let staging = tempfile::Builder::new()
            .prefix(".meshvault-staging-")
            .tempdir_in(&self.install_root)?;
        if let Err(e) = copy_files(&downloaded.root, staging.path(), &downloaded.files).await {
            discard_staging(staging);
            return Err(e);
        }

        let mut asset_ids = metadata.asset_ids.clone();
        let mut remapped_ids = BTreeMap::new();
        let mut resolution = None;

        let report = snapshot.map(|s| classify(&metadata.asset_ids, &s, &destination));
        if let Some(report) = report.as_ref().filter(|r| r.has_conflicts()) {
            let decision = self.policy.resolve(model_id, report);
            warn!(
                model_id = model_id,
                conflicts = report.cross_model.len(),
                resolution = ?decision,
                "Asset identifiers collide with other models"
            );
            resolution = Some(decision);

            match decision {
                Resolution::RegenerateIdentifiers => {
                    let conflicting: HashSet<&str> = report.conflicting_ids().collect();
                    for id in asset_ids.iter_mut() {
                        if conflicting.contains(id.as_str()) {
                            let fresh = Uuid::new_v4().to_string();
                            remapped_ids.insert(id.clone(), fresh.clone());
                            *id = fresh;
                        }
                    }
                }
                Resolution::KeepExisting => {}
                Resolution::Abort => {
                    discard_staging(staging);
                    return Err(MeshvaultError::Conflict(format!(
                        "{} asset identifier(s) of {}@{} already belong to other models",
                        report.cross_model.len(),
                        model_id,
                        metadata.version
                    )));
                }
            }
        }

        let promoted = promote(staging.path(), &destination, &downloaded.files).await;
        discard_staging(staging);
        promoted?;

        // Files of the replaced version that the new one no longer ships
        if let Some(previous) = previous.as_ref().filter(|_| update_in_place) {
            let current: HashSet<&String> = downloaded.files.iter().collect();
            for stale in previous.files.iter().filter(|f| !current.contains(f)) {
                if let Err(e) = tokio::fs::remove_file(destination.join(stale)).await {
                    debug!(file = %stale, error = %e, "Stale file not removed");
                }
            }
        }

        let record = InstallRecord {
            model_id: model_id.to_string(),
            name: metadata.identity.name.clone(),
            version: Some(metadata.version.clone()),
            installed_at: self.clock.now(),
            asset_ids,
            remapped_ids,
            files: downloaded.files.clone(),
        };
        record.write(&destination).await?;

        info!(
            model_id = model_id,
            version = %metadata.version,
            files = downloaded.files.len(),
            "Version installed"
        );

        Ok(InstallOutcome {
            folder: destination,
            record,
            report,
            resolution,
        })
    }
}

/// A display name reduced to a safe single folder name
fn folder_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim().to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Copy every file into `destination`
async fn copy_files(source: &Path, destination: &Path, files: &[String]) -> MeshvaultResult<()> {
    for relative in files {
        let target = destination.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source.join(relative), &target).await?;
    }
    Ok(())
}

/// Move staged files over the destination, one rename per file
async fn promote(staging: &Path, destination: &Path, files: &[String]) -> MeshvaultResult<()> {
    for relative in files {
        let target = destination.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(staging.join(relative), &target).await?;
    }
    Ok(())
}

fn discard_staging(staging: TempDir) {
    let path = staging.path().to_path_buf();
    if let Err(e) = staging.close() {
        warn!(path = %path.display(), error = %e, "Failed to remove install staging directory");
    }
}
