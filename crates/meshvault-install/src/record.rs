//! Install records and workspace scanning
//!
//! Every installed model folder carries a small marker file naming the model
//! and version that was installed there. Scanning the workspace for markers
//! answers "which version is installed" and "which asset ids exist where".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshvault_core::layout::INSTALL_RECORD_FILE_NAME;
use meshvault_core::{MeshvaultError, MeshvaultResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::conflict::{AssetRegistry, AssetSnapshot};

/// Version placeholder written by older installers that could not tell
pub const UNKNOWN_VERSION: &str = "(unknown)";

/// Marker persisted inside an installed model folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub model_id: String,
    #[serde(default)]
    pub name: String,
    /// Installed version, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub installed_at: DateTime<Utc>,
    /// Asset identifiers as present in the workspace
    #[serde(default)]
    pub asset_ids: Vec<String>,
    /// Original → regenerated identifiers, when a conflict forced new ones
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remapped_ids: BTreeMap<String, String>,
    /// Installed payload paths relative to the folder
    #[serde(default)]
    pub files: Vec<String>,
}

impl InstallRecord {
    /// Read the record of a folder, if it has one
    pub async fn read(folder: &Path) -> MeshvaultResult<Option<Self>> {
        match tokio::fs::read(folder.join(INSTALL_RECORD_FILE_NAME)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the record into a folder
    pub async fn write(&self, folder: &Path) -> MeshvaultResult<()> {
        tokio::fs::create_dir_all(folder).await?;
        let serialized = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(folder.join(INSTALL_RECORD_FILE_NAME), serialized).await?;
        Ok(())
    }

    /// Installed version when it is positively known
    pub fn known_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != UNKNOWN_VERSION)
    }
}

/// A model found installed in the workspace
#[derive(Debug, Clone)]
pub struct LocalInstall {
    /// Folder holding the installed files
    pub folder: PathBuf,
    pub record: InstallRecord,
}

/// Source of locally installed models
#[async_trait]
pub trait InstalledModels: Send + Sync {
    /// Every installed model the source can find
    async fn installed(&self) -> MeshvaultResult<Vec<LocalInstall>>;
}

/// Discovers install records under a workspace root
#[derive(Debug, Clone)]
pub struct WorkspaceScanner {
    root: PathBuf,
}

impl WorkspaceScanner {
    /// Create a scanner for a workspace root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk the workspace and parse every install record
    pub async fn scan(&self) -> MeshvaultResult<Vec<LocalInstall>> {
        let root = self.root.clone();
        let installs = tokio::task::spawn_blocking(move || scan_blocking(&root))
            .await
            .map_err(|e| MeshvaultError::Backend(format!("workspace scan task failed: {}", e)))?;
        debug!(count = installs.len(), "Scanned workspace for installs");
        Ok(installs)
    }
}

fn scan_blocking(root: &Path) -> Vec<LocalInstall> {
    let mut installs = Vec::new();
    if !root.exists() {
        return installs;
    }

    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() || entry.file_name() != INSTALL_RECORD_FILE_NAME {
            continue;
        }
        let Some(folder) = entry.path().parent() else {
            continue;
        };

        let parsed = std::fs::read(entry.path())
            .map_err(MeshvaultError::from)
            .and_then(|bytes| serde_json::from_slice::<InstallRecord>(&bytes).map_err(Into::into));
        match parsed {
            Ok(record) => installs.push(LocalInstall {
                folder: folder.to_path_buf(),
                record,
            }),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable install record"),
        }
    }

    installs.sort_by(|a, b| a.folder.cmp(&b.folder));
    installs
}

#[async_trait]
impl InstalledModels for WorkspaceScanner {
    async fn installed(&self) -> MeshvaultResult<Vec<LocalInstall>> {
        self.scan().await
    }
}

#[async_trait]
impl AssetRegistry for WorkspaceScanner {
    async fn snapshot(&self) -> MeshvaultResult<AssetSnapshot> {
        let mut snapshot = AssetSnapshot::default();
        for install in self.scan().await? {
            for asset_id in &install.record.asset_ids {
                snapshot.insert(asset_id.clone(), install.folder.clone());
            }
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(model_id: &str, version: Option<&str>, ids: &[&str]) -> InstallRecord {
        InstallRecord {
            model_id: model_id.to_string(),
            name: model_id.to_string(),
            version: version.map(str::to_string),
            installed_at: Utc::now(),
            asset_ids: ids.iter().map(|s| s.to_string()).collect(),
            remapped_ids: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    #[test]
    fn test_known_version() {
        assert_eq!(record("a", Some("1.0.0"), &[]).known_version(), Some("1.0.0"));
        assert_eq!(record("a", Some(UNKNOWN_VERSION), &[]).known_version(), None);
        assert_eq!(record("a", Some(" "), &[]).known_version(), None);
        assert_eq!(record("a", None, &[]).known_version(), None);
    }

    #[tokio::test]
    async fn test_read_write() {
        let dir = TempDir::new().unwrap();
        assert!(InstallRecord::read(dir.path()).await.unwrap().is_none());

        let rec = record("chair", Some("1.0.0"), &["x"]);
        rec.write(dir.path()).await.unwrap();
        assert_eq!(InstallRecord::read(dir.path()).await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_scan_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("Models");
        record("chair", Some("1.0.0"), &["x", "y"])
            .write(&models.join("Chair"))
            .await
            .unwrap();
        record("table", None, &["z"])
            .write(&models.join("Table"))
            .await
            .unwrap();
        tokio::fs::create_dir_all(models.join("Broken")).await.unwrap();
        tokio::fs::write(models.join("Broken").join(INSTALL_RECORD_FILE_NAME), b"not a record")
            .await
            .unwrap();

        let scanner = WorkspaceScanner::new(dir.path());
        let installs = scanner.installed().await.unwrap();
        assert_eq!(installs.len(), 2);
        assert_eq!(installs[0].record.model_id, "chair");

        let snapshot = scanner.snapshot().await.unwrap();
        assert_eq!(snapshot.location("y"), Some(models.join("Chair").as_path()));
        assert_eq!(snapshot.location("z"), Some(models.join("Table").as_path()));
        assert_eq!(snapshot.len(), 3);
    }

    #[tokio::test]
    async fn test_scan_missing_root() {
        let scanner = WorkspaceScanner::new("/nonexistent/meshvault/workspace");
        assert!(scanner.scan().await.unwrap().is_empty());
    }
}
