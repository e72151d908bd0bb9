//! Asset-identity conflict detection
//!
//! Before a downloaded version is materialized, its asset identifiers are
//! compared with the identifiers already present in the workspace. The
//! comparison must use a snapshot taken before any file of the version is
//! written, otherwise every identifier of the version would match itself.

use async_trait::async_trait;
use meshvault_core::MeshvaultResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Identifier → folder that owns it, captured before an import
#[derive(Debug, Clone, Default)]
pub struct AssetSnapshot {
    locations: HashMap<String, PathBuf>,
}

impl AssetSnapshot {
    /// Record where an identifier lives
    pub fn insert(&mut self, asset_id: impl Into<String>, location: impl Into<PathBuf>) {
        self.locations.insert(asset_id.into(), location.into());
    }

    /// Where an identifier lives, if present
    pub fn location(&self, asset_id: &str) -> Option<&Path> {
        self.locations.get(asset_id).map(PathBuf::as_path)
    }

    /// Number of known identifiers
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no identifiers are known
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl<K: Into<String>, V: Into<PathBuf>> FromIterator<(K, V)> for AssetSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = AssetSnapshot::default();
        for (id, location) in iter {
            snapshot.insert(id, location);
        }
        snapshot
    }
}

/// Host-side view of which asset identifiers exist in the workspace
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    /// Capture the identifiers currently present
    async fn snapshot(&self) -> MeshvaultResult<AssetSnapshot>;
}

/// An identifier of the incoming version that already exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMatch {
    pub asset_id: String,
    /// Folder the existing identifier belongs to
    pub existing_location: PathBuf,
}

/// Classified identifier matches for one import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    /// Matches inside the destination folder; expected and harmless
    pub same_model: Vec<AssetMatch>,
    /// Matches owned by other folders; a real conflict
    pub cross_model: Vec<AssetMatch>,
}

impl ConflictReport {
    /// Whether a resolution decision is required
    pub fn has_conflicts(&self) -> bool {
        !self.cross_model.is_empty()
    }

    /// Identifiers that collide with other models
    pub fn conflicting_ids(&self) -> impl Iterator<Item = &str> {
        self.cross_model.iter().map(|m| m.asset_id.as_str())
    }
}

/// Partition the version's identifiers that already exist by owner
pub fn classify(asset_ids: &[String], snapshot: &AssetSnapshot, destination: &Path) -> ConflictReport {
    let mut report = ConflictReport::default();

    for asset_id in asset_ids {
        let Some(location) = snapshot.location(asset_id) else {
            continue;
        };
        let found = AssetMatch {
            asset_id: asset_id.clone(),
            existing_location: location.to_path_buf(),
        };
        if location.starts_with(destination) {
            report.same_model.push(found);
        } else {
            report.cross_model.push(found);
        }
    }

    report
}

/// How to proceed when identifiers collide with another model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Give this import fresh identifiers
    RegenerateIdentifiers,
    /// Keep the existing identifiers and accept broken references
    KeepExisting,
    /// Roll back this import
    Abort,
}

/// Strategy for deciding how to resolve a conflict
pub trait ConflictPolicy: Send + Sync {
    /// Choose a resolution for a report with cross-model matches
    fn resolve(&self, model_id: &str, report: &ConflictReport) -> Resolution;
}

/// Policy that always answers the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub Resolution);

impl ConflictPolicy for FixedPolicy {
    fn resolve(&self, _model_id: &str, _report: &ConflictReport) -> Resolution {
        self.0
    }
}

impl Default for FixedPolicy {
    fn default() -> Self {
        FixedPolicy(Resolution::Abort)
    }
}
