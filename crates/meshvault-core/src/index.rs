//! Catalog of all models known to a repository

use crate::semver::{sort_versions_descending, SemVer};
use crate::{MeshvaultError, MeshvaultResult, ModelMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Catalog entry for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Latest advertised version
    #[serde(default)]
    pub latest_version: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// First time the model was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    /// Labels restricting visibility; empty means public
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Every version published through the index
    #[serde(default)]
    pub versions: Vec<String>,
}

impl IndexEntry {
    /// Empty entry for a model id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            latest_version: String::new(),
            tags: BTreeSet::new(),
            updated_at: None,
            released_at: None,
            scopes: Vec::new(),
            versions: Vec::new(),
        }
    }

    /// Fold a published version's metadata into the entry.
    ///
    /// `latest_version` only moves when the incoming version is not older, or
    /// when either side fails to parse. Name, description, tags and scopes
    /// follow the latest version, so publishing an older version only adds it
    /// to `versions`. Returns whether `latest_version` changed.
    pub fn apply(&mut self, metadata: &ModelMetadata, now: DateTime<Utc>) -> bool {
        self.updated_at = Some(metadata.updated_at.unwrap_or(now));
        if self.released_at.is_none() {
            self.released_at = Some(metadata.created_at.unwrap_or(now));
        }

        if !metadata.version.is_empty() && !self.versions.contains(&metadata.version) {
            self.versions.push(metadata.version.clone());
            sort_versions_descending(&mut self.versions);
        }

        let advance = should_advance(&self.latest_version, &metadata.version);
        if advance {
            self.latest_version = metadata.version.clone();
            if !metadata.identity.name.is_empty() {
                self.name = metadata.identity.name.clone();
            }
            self.description = metadata.description.clone();
            self.tags = metadata.tags.clone();
            self.scopes = metadata.scopes.clone();
        }
        advance
    }

    /// Whether the entry is visible to a caller holding `labels`
    pub fn visible_to(&self, labels: &[String]) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| labels.contains(s))
    }
}

/// Latest-version advancement rule.
///
/// Accepts `incoming` when it is `>=` the stored version, when nothing is
/// stored, or when either side is not valid SemVer.
pub fn should_advance(stored: &str, incoming: &str) -> bool {
    if incoming.is_empty() {
        return false;
    }
    if stored.is_empty() {
        return true;
    }
    match (SemVer::parse(stored), SemVer::parse(incoming)) {
        (Ok(stored), Ok(incoming)) => incoming >= stored,
        _ => true,
    }
}

/// Mapping from model id to its catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelIndex {
    #[serde(default)]
    pub entries: BTreeMap<String, IndexEntry>,
}

impl ModelIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Resolve or create the entry for the metadata's model and apply it
    pub fn upsert(
        &mut self,
        metadata: &ModelMetadata,
        now: DateTime<Utc>,
    ) -> MeshvaultResult<&IndexEntry> {
        if !metadata.identity.has_id() {
            return Err(MeshvaultError::InvalidArgument(
                "metadata has no model id".to_string(),
            ));
        }

        let id = metadata.identity.id.clone();
        let entry = self
            .entries
            .entry(id.clone())
            .or_insert_with(|| IndexEntry::new(id));
        entry.apply(metadata, now);
        Ok(entry)
    }

    /// Entries visible to a caller holding `labels`
    pub fn visible_entries<'a>(&'a self, labels: &'a [String]) -> impl Iterator<Item = &'a IndexEntry> {
        self.entries.values().filter(move |e| e.visible_to(labels))
    }

    /// Number of models
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no models
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
