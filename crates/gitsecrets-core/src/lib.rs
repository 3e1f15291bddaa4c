//! git-secrets core - shared functionality for the git-secrets tool
//!
//! Holds the pieces that do not depend on a project document: where
//! things live on disk, the global store of named AES keys, and the
//! table formatting used by the CLI.

pub mod config;
pub mod format;
pub mod paths;

pub use config::{ConfigError, FileStorage, GlobalConfig, MemoryStorage, StorageProvider};
pub use paths::Paths;
