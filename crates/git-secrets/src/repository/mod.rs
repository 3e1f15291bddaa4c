//! Context-inheriting repository
//!
//! The repository owns every context of a project document, the flat lists
//! of secrets and configs across all contexts, and the named render targets.
//! `default` is the root context: it is added first, and any other context
//! may only override keys that `default` already declares. Reads go through
//! the merge view of the selected context, computed fresh on every call.

mod context;
mod entry;
mod render_target;
mod writer;

pub use context::{Context, FileToRender};
pub use entry::{Config, Entry, Secret};
pub use render_target::RenderTarget;
pub use writer::ConfigWriter;

use gitsecrets_core::GlobalConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::encryption::{SecretOverrides, SecretResolver};
use crate::error::{Result, SecretsError};

/// Name of the root context
pub const DEFAULT_CONTEXT_NAME: &str = "default";

pub struct Repository {
    config_version: u32,
    config_file_used: Option<PathBuf>,
    contexts: Vec<Context>,
    selected: Option<usize>,
    secrets: Vec<Secret>,
    configs: Vec<Config>,
    render_targets: Vec<RenderTarget>,
    writer: Option<Box<dyn ConfigWriter>>,
}

impl Repository {
    pub fn new(config_version: u32, config_file_used: Option<PathBuf>) -> Self {
        Self {
            config_version,
            config_file_used,
            contexts: Vec::new(),
            selected: None,
            secrets: Vec::new(),
            configs: Vec::new(),
            render_targets: Vec::new(),
            writer: None,
        }
    }

    pub fn config_version(&self) -> u32 {
        self.config_version
    }

    /// Document this repository was loaded from
    pub fn config_file_used(&self) -> Option<&Path> {
        self.config_file_used.as_deref()
    }

    pub fn set_writer(&mut self, writer: Box<dyn ConfigWriter>) {
        self.writer = Some(writer);
    }

    /// Writer persisting mutations of the underlying document
    pub fn writer_mut(&mut self) -> Result<&mut Box<dyn ConfigWriter>> {
        self.writer
            .as_mut()
            .ok_or_else(|| SecretsError::validation("repository has no config writer attached"))
    }

    // --- contexts ---

    /// Add a context. `default` must come first and only once.
    pub fn add_context(&mut self, context: Context) -> Result<()> {
        let has_default = self.default_context().is_some();
        let is_default = context.name() == DEFAULT_CONTEXT_NAME;

        if !has_default && !is_default {
            return Err(SecretsError::validation(
                "the default context must be added first",
            ));
        }
        if has_default && is_default {
            return Err(SecretsError::validation(
                "the default context is already defined",
            ));
        }
        if self.context(context.name()).is_some() {
            return Err(SecretsError::validation(format!(
                "the context {} is already defined",
                context.name()
            )));
        }

        debug!(context = context.name(), resolver = %context.resolver().describe(), "added context");
        self.contexts.push(context);
        Ok(())
    }

    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts.iter().find(|c| c.name() == name)
    }

    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    pub fn default_context(&self) -> Option<&Context> {
        self.context(DEFAULT_CONTEXT_NAME)
    }

    /// Select the context used for reads. On failure the selection is unchanged.
    pub fn set_selected_context(&mut self, name: &str) -> Result<&Context> {
        let idx = self
            .contexts
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| SecretsError::not_found("context", name))?;
        self.selected = Some(idx);
        Ok(&self.contexts[idx])
    }

    pub fn current(&self) -> Result<&Context> {
        self.selected
            .map(|idx| &self.contexts[idx])
            .ok_or(SecretsError::NoContextSelected)
    }

    /// Whether the selected context is `default`
    pub fn is_default(&self) -> bool {
        self.current()
            .map(|c| c.name() == DEFAULT_CONTEXT_NAME)
            .unwrap_or(false)
    }

    /// Force every context onto one key source
    pub fn override_resolver(&mut self, resolver: SecretResolver) {
        debug!(resolver = %resolver.describe(), "overriding resolver of all contexts");
        for context in &mut self.contexts {
            context.set_resolver(resolver.clone());
        }
    }

    fn ensure_override_allowed(
        &self,
        kind: &str,
        name: &str,
        origin: &str,
        in_default: bool,
    ) -> Result<()> {
        if self.context(origin).is_none() {
            return Err(SecretsError::not_found("context", origin));
        }
        if origin != DEFAULT_CONTEXT_NAME && !in_default {
            return Err(SecretsError::validation(format!(
                "{} {} defined in context {} is not defined in the default context",
                kind, name, origin
            )));
        }
        Ok(())
    }

    // --- secrets ---

    /// Add a secret; overrides need a same-named secret in `default`
    pub fn add_secret(&mut self, secret: Secret) -> Result<()> {
        let in_default = entry::by_context(&self.secrets, DEFAULT_CONTEXT_NAME)
            .iter()
            .any(|s| s.name == secret.name);
        self.ensure_override_allowed("secret", &secret.name, &secret.origin_context, in_default)?;

        debug!(secret = %secret.name, context = %secret.origin_context, "added secret");
        self.secrets.push(secret);
        Ok(())
    }

    /// All secrets of all contexts, sorted by name
    pub fn secrets(&self) -> Vec<&Secret> {
        entry::sorted(self.secrets.iter().collect())
    }

    /// Secrets declared by `context`, sorted by name
    pub fn secrets_by_context(&self, context: &str) -> Vec<&Secret> {
        entry::sorted(entry::by_context(&self.secrets, context))
    }

    /// Merge view of the selected context
    pub fn current_secrets(&self) -> Result<Vec<&Secret>> {
        let current = self.current()?;
        Ok(entry::merged(&self.secrets, current.name()))
    }

    pub fn current_secret(&self, name: &str) -> Result<Option<&Secret>> {
        Ok(self.current_secrets()?.into_iter().find(|s| s.name == name))
    }

    /// Decode a secret with the engine of the context that declared it
    pub fn decode_secret(&self, secret: &Secret) -> Result<String> {
        let origin = self
            .context(&secret.origin_context)
            .ok_or_else(|| SecretsError::not_found("context", &secret.origin_context))?;
        origin
            .decode_value(&secret.encoded_value)
            .map_err(|e| e.for_secret(&secret.name, &secret.origin_context))
    }

    /// Decode the whole merge view; the first failing secret aborts
    pub fn secrets_map_decoded(&self) -> Result<BTreeMap<String, String>> {
        self.current_secrets()?
            .into_iter()
            .map(|secret| -> Result<(String, String)> {
                Ok((secret.name.clone(), self.decode_secret(secret)?))
            })
            .collect()
    }

    // --- configs ---

    /// Add a config; overrides need a same-named config in `default`
    pub fn add_config(&mut self, config: Config) -> Result<()> {
        let in_default = entry::by_context(&self.configs, DEFAULT_CONTEXT_NAME)
            .iter()
            .any(|c| c.name == config.name);
        self.ensure_override_allowed("config", &config.name, &config.origin_context, in_default)?;

        debug!(config = %config.name, context = %config.origin_context, "added config");
        self.configs.push(config);
        Ok(())
    }

    pub fn configs(&self) -> Vec<&Config> {
        entry::sorted(self.configs.iter().collect())
    }

    pub fn configs_by_context(&self, context: &str) -> Vec<&Config> {
        entry::sorted(entry::by_context(&self.configs, context))
    }

    pub fn current_configs(&self) -> Result<Vec<&Config>> {
        let current = self.current()?;
        Ok(entry::merged(&self.configs, current.name()))
    }

    pub fn current_config(&self, name: &str) -> Result<Option<&Config>> {
        Ok(self.current_configs()?.into_iter().find(|c| c.name == name))
    }

    pub fn config_map(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .current_configs()?
            .into_iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect())
    }

    // --- render targets ---

    pub fn add_render_target(&mut self, target: RenderTarget) -> Result<()> {
        if self.has_render_target(&target.name) {
            return Err(SecretsError::validation(format!(
                "the render target {} already exists",
                target.name
            )));
        }
        self.render_targets.push(target);
        Ok(())
    }

    pub fn has_render_target(&self, name: &str) -> bool {
        self.render_targets.iter().any(|t| t.name == name)
    }

    pub fn render_target(&self, name: &str) -> Result<&RenderTarget> {
        self.render_targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SecretsError::not_found("render target", name))
    }

    pub fn render_targets(&self) -> &[RenderTarget] {
        &self.render_targets
    }

    pub fn render_target_names(&self) -> Vec<&str> {
        self.render_targets.iter().map(|t| t.name.as_str()).collect()
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("config_version", &self.config_version)
            .field("config_file_used", &self.config_file_used)
            .field("contexts", &self.contexts)
            .field("selected", &self.selected)
            .field("secrets", &self.secrets)
            .field("configs", &self.configs)
            .field("render_targets", &self.render_targets)
            .finish_non_exhaustive()
    }
}

/// Key source forced from the command line onto every context
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub secret: Option<String>,
    pub secret_name: Option<String>,
    pub secret_env: Option<String>,
}

impl CliOverrides {
    /// The resolver to force, if any; plain beats name beats env
    pub fn resolver(
        &self,
        overrides: &Arc<SecretOverrides>,
        global: &Arc<GlobalConfig>,
    ) -> Option<SecretResolver> {
        let given = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(String::from);

        if let Some(secret) = given(&self.secret) {
            Some(SecretResolver::plain(secret))
        } else if let Some(name) = given(&self.secret_name) {
            Some(SecretResolver::named(name, Arc::clone(overrides), Arc::clone(global)))
        } else {
            given(&self.secret_env).map(SecretResolver::env)
        }
    }
}
