//! Global configuration store
//!
//! Named AES keys live outside of any project, in a YAML file under the
//! user's config directory:
//!
//! ```yaml
//! secrets.myproject: Ohqu7lahn4AiQu3reecoo1ausoo7aiy0
//! ```
//!
//! Project documents refer to these keys by name (`decryptSecret.fromName`).
//! The storage backend is pluggable so tests can run against memory.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Prefix of all named secret keys in the store
pub const SECRET_KEY_PREFIX: &str = "secrets";

/// Global config errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid key name '{0}': only alphanumeric characters [A-Za-z0-9] are allowed")]
    InvalidKeyName(String),

    #[error("invalid key length {0}: only keys of 16, 24 or 32 bytes are allowed")]
    InvalidKeyLength(usize),

    #[error("global secret {0} already exists, use --force to overwrite")]
    AlreadyExists(String),

    #[error("could not parse global config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("could not serialize global config: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backing storage of the global config: a flat key -> string store
pub trait StorageProvider: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn all_keys(&self) -> Vec<String>;
    fn set(&mut self, key: &str, value: &str);
    /// Persist pending changes
    fn write_config(&self) -> Result<(), ConfigError>;
}

/// In-memory storage, never persisted
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    storage: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for MemoryStorage {
    fn get_string(&self, key: &str) -> Option<String> {
        self.storage.get(key).cloned()
    }

    fn all_keys(&self) -> Vec<String> {
        self.storage.keys().cloned().collect()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.storage.insert(key.to_string(), value.to_string());
    }

    fn write_config(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// YAML file storage
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    storage: BTreeMap<String, String>,
}

impl FileStorage {
    /// Load the store from `path`; a missing file is an empty store
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let storage = if path.exists() {
            let content = fs::read_to_string(path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = storage.len(), "loaded global config");

        Ok(Self {
            path: path.to_path_buf(),
            storage,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageProvider for FileStorage {
    fn get_string(&self, key: &str) -> Option<String> {
        self.storage.get(key).cloned()
    }

    fn all_keys(&self) -> Vec<String> {
        self.storage.keys().cloned().collect()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.storage.insert(key.to_string(), value.to_string());
    }

    fn write_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(&self.storage)?;
        fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), "wrote global config");
        Ok(())
    }
}

/// Global config: named AES keys over a storage provider
pub struct GlobalConfig {
    storage: Box<dyn StorageProvider>,
}

impl GlobalConfig {
    pub fn new(storage: Box<dyn StorageProvider>) -> Self {
        Self { storage }
    }

    /// Global config backed by memory
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    /// Global config backed by a YAML file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(Box::new(FileStorage::load_from(path)?)))
    }

    /// Look up a named secret; empty values count as missing
    pub fn secret(&self, name: &str) -> Option<String> {
        self.storage
            .get_string(&secret_config_key(name))
            .filter(|v| !v.is_empty())
    }

    /// Store a named secret after validating name and key length
    pub fn set_secret(&mut self, name: &str, value: &str, force: bool) -> Result<(), ConfigError> {
        validate_key_name(name)?;
        validate_aes_key(value.as_bytes())?;

        if self.secret(name).is_some() && !force {
            return Err(ConfigError::AlreadyExists(name.to_string()));
        }

        self.storage.set(&secret_config_key(name), value);
        self.storage.write_config()
    }

    /// Names of all stored secrets, sorted
    pub fn secret_keys(&self) -> Vec<String> {
        let prefix = format!("{}.", SECRET_KEY_PREFIX);
        let mut keys: Vec<String> = self
            .storage
            .all_keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(String::from))
            .collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("secret_keys", &self.secret_keys())
            .finish()
    }
}

fn secret_config_key(name: &str) -> String {
    format!("{}.{}", SECRET_KEY_PREFIX, name.to_lowercase())
}

fn key_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid key name regex"))
}

/// Key names are plain ASCII alphanumerics
pub fn validate_key_name(name: &str) -> Result<(), ConfigError> {
    if key_name_regex().is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidKeyName(name.to_string()))
    }
}

/// AES keys must be 16, 24 or 32 bytes
pub fn validate_aes_key(key: &[u8]) -> Result<(), ConfigError> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        other => Err(ConfigError::InvalidKeyLength(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY_32: &str = "riz9ohg9IefeeG8sha0quoa6it6uan6b";

    #[test]
    fn test_set_and_get_secret() {
        let mut global = GlobalConfig::in_memory();
        global.set_secret("original", KEY_32, false).unwrap();
        assert_eq!(global.secret("original").as_deref(), Some(KEY_32));
        assert_eq!(global.secret("missing"), None);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut global = GlobalConfig::in_memory();
        global.set_secret("MyProject", KEY_32, false).unwrap();
        assert_eq!(global.secret("myproject").as_deref(), Some(KEY_32));
        assert_eq!(global.secret_keys(), vec!["myproject".to_string()]);
    }

    #[test]
    fn test_refuses_overwrite_without_force() {
        let mut global = GlobalConfig::in_memory();
        global.set_secret("key", KEY_32, false).unwrap();

        let err = global.set_secret("key", "0123456789abcdef", false).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists(_)));

        global.set_secret("key", "0123456789abcdef", true).unwrap();
        assert_eq!(global.secret("key").as_deref(), Some("0123456789abcdef"));
    }

    #[test]
    fn test_key_name_validation() {
        assert!(validate_key_name("abc").is_ok());
        assert!(validate_key_name("key0").is_ok());
        assert!(validate_key_name("Key2024").is_ok());
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name("my-key").is_err());
        assert!(validate_key_name("my.key").is_err());
        assert!(validate_key_name("my key").is_err());
    }

    #[test]
    fn test_key_length_validation() {
        assert!(validate_aes_key(&[0u8; 16]).is_ok());
        assert!(validate_aes_key(&[0u8; 24]).is_ok());
        assert!(validate_aes_key(&[0u8; 32]).is_ok());
        assert!(matches!(
            validate_aes_key(&[0u8; 31]),
            Err(ConfigError::InvalidKeyLength(31))
        ));
        assert!(validate_aes_key(b"").is_err());
    }

    #[test]
    fn test_invalid_secret_is_not_stored() {
        let mut global = GlobalConfig::in_memory();
        assert!(global.set_secret("short", "tooshort", false).is_err());
        assert!(global.set_secret("bad-name", KEY_32, false).is_err());
        assert!(global.secret_keys().is_empty());
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.yaml");

        let mut global = GlobalConfig::load_from(&path).unwrap();
        assert!(global.secret_keys().is_empty());
        global.set_secret("first", KEY_32, false).unwrap();
        global.set_secret("second", "0123456789abcdef", false).unwrap();
        assert!(path.exists());

        let reloaded = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.secret_keys(), vec!["first", "second"]);
        assert_eq!(reloaded.secret("first").as_deref(), Some(KEY_32));
    }

    #[test]
    fn test_file_storage_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "- not\n- a\n- map\n").unwrap();

        let err = FileStorage::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_debug_hides_values() {
        let mut global = GlobalConfig::in_memory();
        global.set_secret("key", KEY_32, false).unwrap();
        let debug = format!("{:?}", global);
        assert!(debug.contains("key"));
        assert!(!debug.contains(KEY_32));
    }
}
