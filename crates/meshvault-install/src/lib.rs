//! meshvault-install: Workspace installation and update detection
//!
//! This crate connects the local cache to the workspace:
//! - Install records and workspace scanning
//! - Asset-identity conflict detection and resolution
//! - Installing cached versions
//! - Time-windowed update detection

pub mod conflict;
pub mod installer;
pub mod record;
pub mod updates;

pub use conflict::{AssetRegistry, ConflictPolicy, ConflictReport, FixedPolicy, Resolution};
pub use installer::{InstallOutcome, Installer};
pub use record::{InstallRecord, InstalledModels, LocalInstall, WorkspaceScanner};
pub use updates::{UpdateDetector, UpdateInfo};
