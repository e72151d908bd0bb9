//! meshvault-backend: Repository backend abstraction
//!
//! This crate defines the storage contract the repository engine depends on
//! and ships a file-system implementation of it.

pub mod fs;
pub mod traits;

pub use fs::FsBackend;
pub use traits::RepositoryBackend;
