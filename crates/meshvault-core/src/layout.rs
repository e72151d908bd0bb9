//! Repository and cache path layout
//!
//! Versions live under `{model_id}/{version}/` in the repository and in the
//! local cache. Repository paths are always `/`-separated and relative.

use crate::{MeshvaultError, MeshvaultResult};

/// Metadata side-file stored next to the payload of every version
pub const METADATA_FILE_NAME: &str = "model.json";

/// Catalog file at the repository root
pub const INDEX_FILE_NAME: &str = "index.json";

/// Marker written into an installed model folder
pub const INSTALL_RECORD_FILE_NAME: &str = ".meshvault-install.json";

/// Check that a model id or version can be used as a single path segment
pub fn validate_segment(kind: &str, value: &str) -> MeshvaultResult<()> {
    if value.is_empty() {
        return Err(MeshvaultError::InvalidArgument(format!("{} is empty", kind)));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(MeshvaultError::InvalidArgument(format!(
            "{} '{}' is not a valid path segment",
            kind, value
        )));
    }
    Ok(())
}

/// Repository-relative root of a version: `{model_id}/{version}`
pub fn version_root(model_id: &str, version: &str) -> MeshvaultResult<String> {
    validate_segment("model id", model_id)?;
    validate_segment("version", version)?;
    Ok(format!("{}/{}", model_id, version))
}

/// Join repository path segments with `/`
pub fn join(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if root.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", root, relative)
    }
}

/// Strip `prefix/` from a repository path
pub fn strip_root<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let root = root.trim_end_matches('/');
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Whether a version-relative path is the metadata side-file
pub fn is_metadata_file(relative: &str) -> bool {
    relative == METADATA_FILE_NAME
}

/// Check a repository-relative path for traversal and absolute forms
pub fn validate_repo_path(path: &str) -> MeshvaultResult<()> {
    if path.starts_with('/') || path.contains('\\') {
        return Err(MeshvaultError::InvalidArgument(format!(
            "repository path '{}' must be relative and '/'-separated",
            path
        )));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(MeshvaultError::InvalidArgument(format!(
            "repository path '{}' escapes the repository",
            path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_root() {
        assert_eq!(version_root("chair", "1.0.0").unwrap(), "chair/1.0.0");
        assert!(version_root("", "1.0.0").is_err());
        assert!(version_root("chair", "").is_err());
        assert!(version_root("a/b", "1.0.0").is_err());
        assert!(version_root("chair", "..").is_err());
    }

    #[test]
    fn test_join_and_strip() {
        assert_eq!(join("chair/1.0.0", "mesh/a.mesh"), "chair/1.0.0/mesh/a.mesh");
        assert_eq!(join("", "index.json"), "index.json");
        assert_eq!(strip_root("chair/1.0.0", "chair/1.0.0/mesh/a.mesh"), Some("mesh/a.mesh"));
        assert_eq!(strip_root("chair/1.0.0", "chair/1.0.01/a.mesh"), None);
    }

    #[test]
    fn test_validate_repo_path() {
        assert!(validate_repo_path("chair/1.0.0/a.mesh").is_ok());
        assert!(validate_repo_path("/etc/passwd").is_err());
        assert!(validate_repo_path("chair/../../x").is_err());
    }
}
