//! Version 1 of the project document
//!
//! ```json
//! {
//!   "version": 1,
//!   "context": {
//!     "default": {
//!       "decryptSecret": { "fromName": "myproject" },
//!       "secrets": { "databasePassword": "<base64>" },
//!       "configs": { "databaseHost": "localhost" }
//!     },
//!     "prod": {
//!       "decryptSecret": { "fromEnv": "PROD_SECRET" },
//!       "configs": { "databaseHost": "db.prod" }
//!     }
//!   },
//!   "renderFiles": {
//!     "env": { "files": [ { "fileIn": ".env.dist", "fileOut": ".env" } ] }
//!   }
//! }
//! ```

use gitsecrets_core::GlobalConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::encryption::{SecretOverrides, SecretResolver};
use crate::error::{Result, SecretsError};
use crate::repository::{Config, Context, RenderTarget, Repository, Secret, DEFAULT_CONTEXT_NAME};

pub const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct V1Schema {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub version: u32,

    pub context: IndexMap<String, V1Context>,

    #[serde(
        rename = "renderFiles",
        default,
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub render_files: IndexMap<String, V1RenderTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct V1Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decrypt_secret: Option<V1DecryptSecret>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub configs: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct V1DecryptSecret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_env: Option<String>,
}

impl V1DecryptSecret {
    fn from_name(&self) -> Option<&str> {
        self.from_name.as_deref().filter(|s| !s.is_empty())
    }

    fn from_env(&self) -> Option<&str> {
        self.from_env.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct V1RenderTarget {
    #[serde(default)]
    pub files: Vec<V1RenderFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct V1RenderFile {
    pub file_in: String,
    pub file_out: String,
}

fn has_value(map: &IndexMap<String, String>, key: &str) -> bool {
    map.get(key).is_some_and(|v| !v.is_empty())
}

impl V1Schema {
    /// A document with only a default context decrypting via a named secret
    pub fn initial(secret_name: &str) -> Self {
        let default = V1Context {
            decrypt_secret: Some(V1DecryptSecret {
                from_name: Some(secret_name.to_string()),
                from_env: None,
            }),
            ..Default::default()
        };

        let mut context = IndexMap::new();
        context.insert(DEFAULT_CONTEXT_NAME.to_string(), default);

        Self {
            schema: None,
            version: VERSION,
            context,
            render_files: IndexMap::new(),
        }
    }

    pub fn default_context(&self) -> Option<&V1Context> {
        self.context.get(DEFAULT_CONTEXT_NAME)
    }

    /// Structural checks run before a repository is built and before every write
    pub fn validate(&self) -> Result<()> {
        if self.version != VERSION {
            return Err(SecretsError::validation(format!(
                "not able to process version {}",
                self.version
            )));
        }

        let default = self
            .default_context()
            .ok_or_else(|| SecretsError::validation("context.default is required"))?;

        for (name, context) in &self.context {
            let Some(decrypt) = &context.decrypt_secret else {
                if name == DEFAULT_CONTEXT_NAME {
                    return Err(SecretsError::validation(
                        "context default: you must specify a decryptSecret method",
                    ));
                }
                continue;
            };
            match (decrypt.from_name(), decrypt.from_env()) {
                (Some(_), Some(_)) => {
                    return Err(SecretsError::validation(format!(
                        "context {}: use only one decryptSecret method (fromName or fromEnv)",
                        name
                    )));
                }
                (None, None) if name == DEFAULT_CONTEXT_NAME => {
                    return Err(SecretsError::validation(
                        "context default: you must specify a decryptSecret method",
                    ));
                }
                _ => {}
            }
        }

        for (name, context) in &self.context {
            if name == DEFAULT_CONTEXT_NAME {
                continue;
            }
            if let Some(key) = context.secrets.keys().find(|k| !has_value(&default.secrets, k)) {
                return Err(SecretsError::validation(format!(
                    "secret {} exists in context {} but not in the default context",
                    key, name
                )));
            }
            if let Some(key) = context.configs.keys().find(|k| !has_value(&default.configs, k)) {
                return Err(SecretsError::validation(format!(
                    "config entry {} exists in context {} but not in the default context",
                    key, name
                )));
            }
        }

        Ok(())
    }

    fn resolver(
        decrypt: Option<&V1DecryptSecret>,
        inherited: Option<&SecretResolver>,
        overrides: &Arc<SecretOverrides>,
        global: &Arc<GlobalConfig>,
    ) -> Result<SecretResolver> {
        if let Some(decrypt) = decrypt {
            if let Some(var) = decrypt.from_env() {
                return Ok(SecretResolver::env(var));
            }
            if let Some(name) = decrypt.from_name() {
                return Ok(SecretResolver::named(
                    name,
                    Arc::clone(overrides),
                    Arc::clone(global),
                ));
            }
        }
        inherited
            .cloned()
            .ok_or_else(|| SecretsError::validation("the default context has no decryptSecret"))
    }

    /// Build a repository. `default` is constructed first so that contexts
    /// without their own decrypt method can inherit its resolver.
    pub fn build(
        &self,
        config_file: &Path,
        global: &Arc<GlobalConfig>,
        overrides: &Arc<SecretOverrides>,
    ) -> Result<Repository> {
        self.validate()?;

        let ordered = self
            .context
            .iter()
            .filter(|(name, _)| name.as_str() == DEFAULT_CONTEXT_NAME)
            .chain(
                self.context
                    .iter()
                    .filter(|(name, _)| name.as_str() != DEFAULT_CONTEXT_NAME),
            );

        let mut repository = Repository::new(VERSION, Some(config_file.to_path_buf()));
        let mut default_resolver: Option<SecretResolver> = None;

        for (name, declared) in ordered {
            let resolver = Self::resolver(
                declared.decrypt_secret.as_ref(),
                default_resolver.as_ref(),
                overrides,
                global,
            )?;
            if name == DEFAULT_CONTEXT_NAME {
                default_resolver = Some(resolver.clone());
            }

            repository.add_context(Context::new(name.as_str(), resolver))?;
        }

        for name in repository
            .contexts()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
        {
            let declared = &self.context[&name];
            for (key, value) in &declared.secrets {
                repository.add_secret(Secret::new(key, value, &name))?;
            }
            for (key, value) in &declared.configs {
                repository.add_config(Config::new(key, value, &name))?;
            }
        }

        let base_dir = config_file.parent().unwrap_or_else(|| Path::new(""));
        for (target_name, declared) in &self.render_files {
            let mut target = RenderTarget::new(target_name);
            for file in &declared.files {
                target
                    .add_file_to_render(base_dir.join(&file.file_in), base_dir.join(&file.file_out))
                    .map_err(|e| {
                        SecretsError::validation(format!(
                            "could not add file ({} -> {}) to target {}: {}",
                            file.file_in, file.file_out, target_name, e
                        ))
                    })?;
            }
            repository.add_render_target(target)?;
        }

        Ok(repository)
    }
}
