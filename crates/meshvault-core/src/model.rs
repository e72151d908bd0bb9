//! Model identity, per-version metadata and changelog types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default changelog author when none is supplied
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Stable identity of a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIdentity {
    /// Opaque unique id, assigned once at first submission
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl ModelIdentity {
    /// Create an identity
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Whether an id has been assigned
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// Reference to another model this version depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    /// Model id of the dependency
    pub model_id: String,
    /// Required version, if pinned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Import settings overriding the host defaults for one payload file
pub type ImportOverrides = BTreeMap<String, serde_json::Value>;

/// One changelog line; at most one per version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub version: String,
    pub summary: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// Summary and author for a publish operation
#[derive(Debug, Clone, Default)]
pub struct ChangeNote {
    pub summary: Option<String>,
    pub author: Option<String>,
}

impl ChangeNote {
    /// Note with a summary and author
    pub fn new(summary: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            author: Some(author.into()),
        }
    }
}

/// Metadata of one model version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub identity: ModelIdentity,
    /// Version string; normally SemVer but legacy values are tolerated
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Asset identifiers of the payload files
    #[serde(default)]
    pub asset_ids: Vec<String>,
    /// Payload paths relative to the version root
    #[serde(default)]
    pub payload_files: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Per-file import setting overrides, keyed by payload path
    #[serde(default)]
    pub import_overrides: BTreeMap<String, ImportOverrides>,
    /// Labels restricting catalog visibility; empty means public
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
}

impl ModelMetadata {
    /// Create metadata for a model version
    pub fn new(identity: ModelIdentity, version: impl Into<String>) -> Self {
        Self {
            identity,
            version: version.into(),
            ..Default::default()
        }
    }

    /// Model id shortcut
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Record the changelog entry for `version`, replacing an existing one
    pub fn record_change(
        &mut self,
        version: &str,
        summary: &str,
        author: &str,
        timestamp: DateTime<Utc>,
    ) {
        if let Some(entry) = self.changelog.iter_mut().find(|e| e.version == version) {
            entry.summary = summary.to_string();
            entry.author = author.to_string();
            entry.timestamp = timestamp;
            return;
        }

        self.changelog.push(ChangelogEntry {
            version: version.to_string(),
            summary: summary.to_string(),
            author: author.to_string(),
            timestamp,
        });
    }

    /// Apply a change note with defaults for the current version
    pub fn record_note(&mut self, note: &ChangeNote, default_summary: &str, at: DateTime<Utc>) {
        let summary = note
            .summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(default_summary)
            .to_string();
        let author = note
            .author
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(UNKNOWN_AUTHOR)
            .to_string();
        let version = self.version.clone();
        self.record_change(&version, &summary, &author, at);
    }

    /// Prepend entries from an older history that this changelog lacks
    pub fn carry_history(&mut self, older: &[ChangelogEntry]) {
        let missing: Vec<ChangelogEntry> = older
            .iter()
            .filter(|old| !self.changelog.iter().any(|e| e.version == old.version))
            .cloned()
            .collect();

        if !missing.is_empty() {
            self.changelog.splice(0..0, missing);
        }
    }

    /// Changelog entry for a version
    pub fn change_for(&self, version: &str) -> Option<&ChangelogEntry> {
        self.changelog.iter().find(|e| e.version == version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ModelMetadata {
        ModelMetadata::new(ModelIdentity::new("m-1", "Chair"), "1.0.0")
    }

    #[test]
    fn test_record_change_replaces_same_version() {
        let mut meta = metadata();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);

        meta.record_change("1.0.0", "first", "alice", t0);
        meta.record_change("1.0.0", "second", "bob", t1);

        assert_eq!(meta.changelog.len(), 1);
        let entry = &meta.changelog[0];
        assert_eq!(entry.summary, "second");
        assert_eq!(entry.author, "bob");
        assert_eq!(entry.timestamp, t1);
    }

    #[test]
    fn test_record_note_defaults() {
        let mut meta = metadata();
        meta.record_note(&ChangeNote::default(), "Initial submission", Utc::now());

        let entry = meta.change_for("1.0.0").unwrap();
        assert_eq!(entry.summary, "Initial submission");
        assert_eq!(entry.author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_carry_history() {
        let now = Utc::now();
        let mut base = metadata();
        base.record_change("1.0.0", "Initial submission", "alice", now);

        let mut next = base.clone();
        next.changelog.clear();
        next.version = "1.0.1".to_string();
        next.record_change("1.0.1", "Metadata updated", "bob", now);
        next.carry_history(&base.changelog);

        let versions: Vec<&str> = next.changelog.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0.0", "1.0.1"]);

        next.carry_history(&base.changelog);
        assert_eq!(next.changelog.len(), 2);
    }

    #[test]
    fn test_metadata_tolerates_sparse_json() {
        let meta: ModelMetadata =
            serde_json::from_str(r#"{"identity":{"id":"x"},"version":"legacy"}"#).unwrap();
        assert_eq!(meta.id(), "x");
        assert_eq!(meta.version, "legacy");
        assert!(meta.changelog.is_empty());
        assert!(meta.created_at.is_none());
    }
}
