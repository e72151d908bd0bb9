//! Error types for meshvault

use thiserror::Error;

/// Main error type for meshvault
#[derive(Error, Debug)]
pub enum MeshvaultError {
    /// A required field is missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested operation cannot run on the given input
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Version string did not parse as `major.minor.patch`
    #[error("Format error: {0}")]
    Format(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Some files of a version could not be retrieved
    #[error("Incomplete download of {version_root}: {} file(s) failed", failed.len())]
    IncompleteDownload {
        /// Repository-relative root of the version
        version_root: String,
        /// Repository-relative paths that failed
        failed: Vec<String>,
    },

    /// Asset identifiers collide with another model
    #[error("Asset identifier conflict: {0}")]
    Conflict(String),

    /// Model or version not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for meshvault operations
pub type MeshvaultResult<T> = Result<T, MeshvaultError>;

/// What a caller is expected to do about an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient backend or disk failure, the call may be retried
    Retry,
    /// The input must be corrected
    FixInput,
    /// A user decision is required
    PromptUser,
    /// Not recoverable by the caller
    Internal,
}

impl MeshvaultError {
    /// Classify the error for caller-side handling
    pub fn class(&self) -> ErrorClass {
        match self {
            MeshvaultError::Io(_)
            | MeshvaultError::Backend(_)
            | MeshvaultError::IncompleteDownload { .. } => ErrorClass::Retry,
            MeshvaultError::InvalidArgument(_)
            | MeshvaultError::InvalidOperation(_)
            | MeshvaultError::Format(_)
            | MeshvaultError::NotFound(_)
            | MeshvaultError::Config(_) => ErrorClass::FixInput,
            MeshvaultError::Conflict(_) => ErrorClass::PromptUser,
            MeshvaultError::Serialization(_) => ErrorClass::Internal,
        }
    }

    /// Whether this error belongs to the I/O family
    pub fn is_io(&self) -> bool {
        self.class() == ErrorClass::Retry
    }
}

impl From<serde_json::Error> for MeshvaultError {
    fn from(err: serde_json::Error) -> Self {
        MeshvaultError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MeshvaultError {
    fn from(err: toml::de::Error) -> Self {
        MeshvaultError::Config(err.to_string())
    }
}
