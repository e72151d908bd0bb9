//! Configuration types for meshvault

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshvaultConfig {
    /// Repository backend configuration
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Local download cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Workspace models are installed into
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Publish defaults
    #[serde(default)]
    pub publish: PublishConfig,
    /// Update detection
    #[serde(default)]
    pub updates: UpdatesConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MeshvaultConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::MeshvaultError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::MeshvaultError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::MeshvaultError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Repository backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root directory of the file-system repository
    pub root: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/meshvault/repository"),
        }
    }
}

/// Local cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root of the `{model_id}/{version}` download cache
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("meshvault-cache"),
        }
    }
}

/// Workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace root scanned for installed models
    pub root: PathBuf,
    /// Folder under the root that installs go into
    pub install_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            install_dir: "Models".to_string(),
        }
    }
}

/// Publish defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Changelog author when a publish does not name one
    pub default_author: Option<String>,
    /// Parent directory for clone staging areas (system temp if unset)
    pub staging_dir: Option<PathBuf>,
}

/// Update detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfig {
    /// Seconds a scan result stays fresh
    pub check_interval_secs: u64,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
