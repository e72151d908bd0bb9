//! meshvault-core: Core types for the meshvault model repository
//!
//! This crate provides the fundamental types used throughout meshvault:
//! - Semantic versions and version ordering
//! - Model identity, per-version metadata and changelog
//! - The model index (catalog) and its latest-version rule
//! - Repository path layout
//! - Configuration, clocks and error handling

pub mod clock;
pub mod config;
pub mod error;
pub mod index;
pub mod layout;
pub mod model;
pub mod semver;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use index::*;
pub use model::*;
pub use semver::{compare_version_strings, is_newer, sort_versions_descending, SemVer};
