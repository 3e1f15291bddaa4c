//! Standard paths used by git-secrets

use std::path::{Path, PathBuf};

/// File name of the per-project document
pub const PROJECT_FILE_NAME: &str = ".git-secrets.json";

/// Standard git-secrets paths
pub struct Paths {
    /// Config directory (~/.config/git-secrets)
    pub config: PathBuf,
    /// Global key store (~/.config/git-secrets/config.yaml)
    pub global_config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("git-secrets");

        let global_config = config.join("config.yaml");

        Self {
            config,
            global_config,
        }
    }

    /// Use a custom global store location
    pub fn with_global_config(mut self, path: PathBuf) -> Self {
        self.global_config = path;
        self
    }
}

/// Walk up from `start` looking for a project document.
///
/// Returns `None` when no ancestor holds a `.git-secrets.json`.
pub fn find_project_file(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(PROJECT_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}
