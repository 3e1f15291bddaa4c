use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::v1::{V1Context, V1RenderFile, V1Schema};
use crate::error::{Result, SecretsError};
use crate::repository::{ConfigWriter, DEFAULT_CONTEXT_NAME};

/// Writes mutations back to a v1 document.
///
/// Each mutation is applied to a copy of the document, which replaces the
/// held one only after it validated and was written to disk.
#[derive(Debug, Clone)]
pub struct V1Writer {
    schema: V1Schema,
    path: PathBuf,
}

impl V1Writer {
    pub fn new(schema: V1Schema, path: impl Into<PathBuf>) -> Self {
        Self {
            schema,
            path: path.into(),
        }
    }

    pub fn schema(&self) -> &V1Schema {
        &self.schema
    }

    fn commit(&mut self, next: V1Schema) -> Result<()> {
        write_schema(&next, &self.path)?;
        self.schema = next;
        Ok(())
    }

    fn context_mut<'a>(schema: &'a mut V1Schema, name: &str) -> Result<&'a mut V1Context> {
        schema.context.get_mut(name).ok_or_else(|| {
            SecretsError::validation(format!(
                "the context {} does not exist, add it with 'git-secrets add context {}'",
                name, name
            ))
        })
    }
}

fn write_schema(schema: &V1Schema, path: &Path) -> Result<()> {
    schema
        .validate()
        .map_err(|e| SecretsError::validation(format!("not writing config since it is not valid: {}", e)))?;

    let content = serde_json::to_string_pretty(schema)?;
    fs::write(path, content)?;
    debug!(path = %path.display(), "wrote config");
    Ok(())
}

impl ConfigWriter for V1Writer {
    fn set_secret(
        &mut self,
        context: &str,
        name: &str,
        encoded_value: &str,
        force: bool,
    ) -> Result<()> {
        let mut next = self.schema.clone();

        let in_default = next
            .default_context()
            .is_some_and(|d| d.secrets.get(name).is_some_and(|v| !v.is_empty()));
        let target = Self::context_mut(&mut next, context)?;

        if context != DEFAULT_CONTEXT_NAME && !in_default {
            return Err(SecretsError::validation(format!(
                "define the secret {} in the default context first",
                name
            )));
        }
        if target.secrets.get(name).is_some_and(|v| !v.is_empty()) && !force {
            return Err(SecretsError::validation(format!(
                "the secret {} already exists, use --force to overwrite",
                name
            )));
        }

        target.secrets.insert(name.to_string(), encoded_value.to_string());
        self.commit(next)
    }

    fn set_config(&mut self, context: &str, name: &str, value: &str, force: bool) -> Result<()> {
        let mut next = self.schema.clone();

        let in_default = next
            .default_context()
            .is_some_and(|d| d.configs.get(name).is_some_and(|v| !v.is_empty()));
        let target = Self::context_mut(&mut next, context)?;

        if context != DEFAULT_CONTEXT_NAME && !in_default {
            return Err(SecretsError::validation(format!(
                "define the config entry {} in the default context first",
                name
            )));
        }
        if target.configs.get(name).is_some_and(|v| !v.is_empty()) && !force {
            return Err(SecretsError::validation(format!(
                "the config entry {} already exists, use --force to overwrite",
                name
            )));
        }

        target.configs.insert(name.to_string(), value.to_string());
        self.commit(next)
    }

    fn add_context(&mut self, name: &str) -> Result<()> {
        if self.schema.context.contains_key(name) {
            return Err(SecretsError::validation(format!(
                "the context {} already exists",
                name
            )));
        }

        let mut next = self.schema.clone();
        next.context.insert(name.to_string(), V1Context::default());
        self.commit(next)
    }

    fn add_file_to_render(&mut self, target: &str, file_in: &str, file_out: &str) -> Result<()> {
        let mut next = self.schema.clone();
        let files = &mut next.render_files.entry(target.to_string()).or_default().files;

        if files.iter().any(|f| f.file_in == file_in && f.file_out == file_out) {
            return Err(SecretsError::validation(format!(
                "{} -> {} is already added to target {}",
                file_in, file_out, target
            )));
        }
        if files.iter().any(|f| f.file_out == file_out) {
            return Err(SecretsError::validation(format!(
                "output file {} is already defined on target {}",
                file_out, target
            )));
        }

        files.push(V1RenderFile {
            file_in: file_in.to_string(),
            file_out: file_out.to_string(),
        });
        self.commit(next)
    }

    fn write_config(&self) -> Result<()> {
        write_schema(&self.schema, &self.path)
    }
}

/// Write a starter document decrypting via the global secret `secret_name`
pub fn write_initial_config(path: &Path, secret_name: &str) -> Result<()> {
    if path.exists() {
        return Err(SecretsError::validation(format!(
            "{} already exists",
            path.display()
        )));
    }
    gitsecrets_core::config::validate_key_name(secret_name)?;

    write_schema(&V1Schema::initial(secret_name), path)
}
