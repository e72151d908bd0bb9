//! meshvault-store: Repository engine
//!
//! This crate provides the stateful parts of the repository:
//! - The cached model index
//! - Publishing of new versions and metadata-only revisions
//! - Local cache synchronization

pub mod cache;
pub mod index_cache;
pub mod publisher;

pub use cache::{DownloadedVersion, LocalCache};
pub use index_cache::IndexCache;
pub use publisher::{PublishedVersion, Publisher, VersionBump};
