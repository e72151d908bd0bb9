//! CLI commands implementation

use anyhow::{Context, Result};
use chrono::Duration;
use meshvault_backend::{FsBackend, RepositoryBackend};
use meshvault_core::{
    ChangeNote, Clock, MeshvaultConfig, ModelIdentity, ModelMetadata, SemVer, SystemClock,
};
use meshvault_install::updates::DEFAULT_CHECK_INTERVAL_SECS;
use meshvault_install::{FixedPolicy, Installer, Resolution, UpdateDetector, WorkspaceScanner};
use meshvault_store::{IndexCache, LocalCache, Publisher, VersionBump};
use std::path::Path;
use std::sync::Arc;

use crate::{BumpArg, ConflictArg};

/// Repository handles shared by all commands
pub struct Repo {
    config: MeshvaultConfig,
    backend: Arc<dyn RepositoryBackend>,
    index: Arc<IndexCache>,
    cache: LocalCache,
    clock: Arc<dyn Clock>,
}

impl Repo {
    /// Open the repository and cache named by the configuration
    pub async fn open(config: MeshvaultConfig) -> Result<Self> {
        let fs = FsBackend::new(&config.repository.root);
        fs.init()
            .await
            .with_context(|| format!("opening repository {}", config.repository.root.display()))?;
        let backend: Arc<dyn RepositoryBackend> = Arc::new(fs);

        let cache = LocalCache::new(&config.cache.root, backend.clone());
        cache.init().await?;

        Ok(Self {
            index: Arc::new(IndexCache::new(backend.clone())),
            cache,
            backend,
            clock: Arc::new(SystemClock),
            config,
        })
    }

    fn publisher(&self) -> Publisher {
        let mut publisher = Publisher::new(self.backend.clone(), self.index.clone(), self.clock.clone());
        if let Some(author) = &self.config.publish.default_author {
            publisher = publisher.with_default_author(author.clone());
        }
        if let Some(dir) = &self.config.publish.staging_dir {
            publisher = publisher.with_staging_dir(dir.clone());
        }
        publisher
    }

    fn scanner(&self) -> Arc<WorkspaceScanner> {
        Arc::new(WorkspaceScanner::new(&self.config.workspace.root))
    }

    /// Explicit version, or the latest advertised by the index
    async fn resolve_version(&self, model_id: &str, version: Option<String>) -> Result<String> {
        if let Some(version) = version {
            return Ok(version);
        }
        let entry = self
            .index
            .entry(model_id)
            .await?
            .with_context(|| format!("model '{}' is not in the index", model_id))?;
        if entry.latest_version.is_empty() {
            anyhow::bail!("model '{}' has no published version", model_id);
        }
        Ok(entry.latest_version)
    }
}

/// Fields of a new submission
pub struct SubmitRequest {
    pub id: Option<String>,
    pub name: String,
    pub version: String,
    pub description: String,
    pub asset_ids: Vec<String>,
    pub tags: Vec<String>,
}

/// Edits applied by `update-metadata`
pub struct MetadataEdit {
    pub base: Option<String>,
    pub bump: BumpArg,
    pub version: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

fn change_note(summary: Option<String>, author: Option<String>) -> ChangeNote {
    ChangeNote { summary, author }
}

fn resolve_bump(bump: BumpArg, exact: Option<&str>) -> Result<VersionBump> {
    if let Some(exact) = exact {
        return Ok(VersionBump::Exact(SemVer::parse(exact)?));
    }
    Ok(match bump {
        BumpArg::Patch => VersionBump::Patch,
        BumpArg::Minor => VersionBump::Minor,
        BumpArg::Major => VersionBump::Major,
    })
}

fn resolution(arg: ConflictArg) -> Resolution {
    match arg {
        ConflictArg::Abort => Resolution::Abort,
        ConflictArg::Keep => Resolution::KeepExisting,
        ConflictArg::Regenerate => Resolution::RegenerateIdentifiers,
    }
}

/// Publish a new version
pub async fn submit(
    repo: &Repo,
    path: &Path,
    request: SubmitRequest,
    summary: Option<String>,
    author: Option<String>,
) -> Result<()> {
    let identity = ModelIdentity::new(request.id.unwrap_or_default(), request.name);
    let mut metadata = ModelMetadata::new(identity, request.version);
    metadata.description = request.description;
    metadata.asset_ids = request.asset_ids;
    metadata.tags = request.tags.into_iter().collect();
    if let Some(author) = &author {
        metadata.author = author.clone();
    }

    let published = repo
        .publisher()
        .submit_new_version(metadata, path, change_note(summary, author))
        .await?;

    println!("Published {}", published.root);
    println!("  Model ID: {}", published.metadata.id());
    println!("  Files: {}", published.metadata.payload_files.len());
    Ok(())
}

/// Publish a metadata-only revision
pub async fn update_metadata(
    repo: &Repo,
    model_id: &str,
    edit: MetadataEdit,
    summary: Option<String>,
    author: Option<String>,
) -> Result<()> {
    let base = repo.resolve_version(model_id, edit.base).await?;
    let bump = resolve_bump(edit.bump, edit.version.as_deref())?;

    let mut metadata = repo.backend.load_metadata(model_id, &base).await?;
    if let Some(description) = edit.description {
        metadata.description = description;
    }
    if !edit.tags.is_empty() {
        metadata.tags = edit.tags.into_iter().collect();
    }

    let published = repo
        .publisher()
        .publish_metadata_update(metadata, Some(&base), change_note(summary, author), bump)
        .await?;

    println!("Published {} (from {})", published.root, base);
    Ok(())
}

/// Download a version into the cache
pub async fn download(repo: &Repo, model_id: &str, version: Option<String>) -> Result<()> {
    let version = repo.resolve_version(model_id, version).await?;
    let downloaded = repo.cache.download_version(model_id, &version).await?;

    println!("Downloaded {}@{}", model_id, version);
    println!("  Path: {}", downloaded.root.display());
    println!("  Files: {}", downloaded.files.len());
    Ok(())
}

/// Download and install a version
pub async fn install(
    repo: &Repo,
    model_id: &str,
    version: Option<String>,
    on_conflict: ConflictArg,
) -> Result<()> {
    let version = repo.resolve_version(model_id, version).await?;
    let downloaded = repo.cache.download_version(model_id, &version).await?;

    let workspace = &repo.config.workspace;
    let installer = Installer::new(
        workspace.root.join(&workspace.install_dir),
        repo.scanner(),
        Arc::new(FixedPolicy(resolution(on_conflict))),
        repo.clock.clone(),
    );
    let outcome = installer.install(&downloaded).await?;

    println!("Installed {}@{}", model_id, version);
    println!("  Path: {}", outcome.folder.display());
    if let Some(report) = outcome.report.filter(|r| r.has_conflicts()) {
        println!(
            "  Conflicting asset ids: {}",
            report.conflicting_ids().collect::<Vec<_>>().join(", ")
        );
    }
    for (old, new) in &outcome.record.remapped_ids {
        println!("  Remapped {} -> {}", old, new);
    }
    Ok(())
}

/// List the catalog
pub async fn index(repo: &Repo, labels: &[String], refresh: bool) -> Result<()> {
    if refresh {
        repo.index.refresh().await?;
    }
    let entries = repo.index.visible_entries(labels).await?;

    if entries.is_empty() {
        println!("No models found");
        return Ok(());
    }

    println!("{:<38} {:<24} {:<10} {:<8}", "ID", "NAME", "LATEST", "VERSIONS");
    println!("{}", "-".repeat(84));
    for entry in entries {
        println!(
            "{:<38} {:<24} {:<10} {:<8}",
            entry.id,
            entry.name,
            entry.latest_version,
            entry.versions.len()
        );
    }
    Ok(())
}

/// List versions of a model
pub async fn versions(repo: &Repo, model_id: &str) -> Result<()> {
    let versions = repo.index.list_versions(model_id).await?;
    if versions.is_empty() {
        println!("No versions of '{}' found", model_id);
    }
    for version in versions {
        println!("{}", version);
    }
    Ok(())
}

/// Show available updates
pub async fn updates(repo: &Repo) -> Result<()> {
    let interval = i64::try_from(repo.config.updates.check_interval_secs)
        .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);
    let detector = UpdateDetector::new(repo.index.clone(), repo.scanner(), repo.clock.clone())
        .with_interval(Duration::seconds(interval));

    let updates = detector.updates().await?;
    if updates.is_empty() {
        println!("All installed models are up to date");
        return Ok(());
    }

    println!("{:<24} {:<12} {:<12}", "NAME", "INSTALLED", "AVAILABLE");
    for update in updates {
        println!(
            "{:<24} {:<12} {:<12}",
            update.name, update.local_version, update.remote_version
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_bump() {
        assert_eq!(resolve_bump(BumpArg::Minor, None).unwrap(), VersionBump::Minor);
        assert_eq!(
            resolve_bump(BumpArg::Patch, Some("3.0.0")).unwrap(),
            VersionBump::Exact(SemVer::new(3, 0, 0))
        );
        assert!(resolve_bump(BumpArg::Patch, Some("3.0")).is_err());
    }

    #[tokio::test]
    async fn test_submit_then_resolve_latest() {
        let dir = TempDir::new().unwrap();
        let mut config = MeshvaultConfig::default();
        config.repository.root = dir.path().join("repo");
        config.cache.root = dir.path().join("cache");
        config.workspace.root = dir.path().join("ws");
        let repo = Repo::open(config).await.unwrap();

        let payload = dir.path().join("payload");
        tokio::fs::create_dir_all(&payload).await.unwrap();
        tokio::fs::write(payload.join("a.mesh"), b"v").await.unwrap();

        let request = SubmitRequest {
            id: Some("chair".to_string()),
            name: "Chair".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            asset_ids: Vec::new(),
            tags: Vec::new(),
        };
        submit(&repo, &payload, request, None, None).await.unwrap();

        assert_eq!(repo.resolve_version("chair", None).await.unwrap(), "1.0.0");
        assert_eq!(
            repo.resolve_version("chair", Some("0.9.0".to_string())).await.unwrap(),
            "0.9.0"
        );
        assert!(repo.resolve_version("table", None).await.is_err());
    }
}
