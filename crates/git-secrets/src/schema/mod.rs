//! Project document loading
//!
//! The document is checked for its `version` first, then parsed with the
//! matching schema. Only version 1 exists today.

mod v1;
mod writer;

pub use v1::{V1Context, V1DecryptSecret, V1RenderFile, V1RenderTarget, V1Schema};
pub use writer::{write_initial_config, V1Writer};

use gitsecrets_core::GlobalConfig;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::encryption::SecretOverrides;
use crate::error::{Result, SecretsError};
use crate::repository::Repository;

/// Load a project document into a repository with a writer attached
pub fn parse_repository(
    path: &Path,
    global: Arc<GlobalConfig>,
    overrides: Arc<SecretOverrides>,
) -> Result<Repository> {
    let content = fs::read_to_string(path).map_err(|e| {
        SecretsError::Io(std::io::Error::new(
            e.kind(),
            format!("could not read {}: {}", path.display(), e),
        ))
    })?;

    let document: serde_json::Value = serde_json::from_str(&content)?;
    let version = document
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| SecretsError::validation("the document has no numeric version"))?;

    debug!(path = %path.display(), version, "parsing config");

    match version {
        1 => {
            let schema: V1Schema = serde_json::from_value(document)?;
            let mut repository = schema.build(path, &global, &overrides)?;
            repository.set_writer(Box::new(V1Writer::new(schema, path)));
            Ok(repository)
        }
        other => Err(SecretsError::validation(format!(
            "not able to process version {}",
            other
        ))),
    }
}
