//! Rendering engine
//!
//! Builds the data a template sees from the selected context of a
//! repository and hands it to a template engine. All secrets of the merge
//! view are decoded before any template is read, so one undecodable secret
//! fails the render without touching the output file.

mod template;

pub use template::{PlaceholderTemplate, TemplateEngine};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use tracing::{debug, info};

use crate::error::{Result, SecretsError};
use crate::repository::{FileToRender, Repository};

/// Everything a template can reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RenderingContext {
    pub context_name: String,
    pub file: FileToRender,
    pub secrets: BTreeMap<String, String>,
    pub configs: BTreeMap<String, String>,
}

pub struct RenderingEngine<'a, T = PlaceholderTemplate> {
    repository: &'a Repository,
    templates: T,
}

impl<'a> RenderingEngine<'a> {
    pub fn new(repository: &'a Repository) -> Self {
        Self::with_template(repository, PlaceholderTemplate)
    }
}

impl<'a, T: TemplateEngine> RenderingEngine<'a, T> {
    pub fn with_template(repository: &'a Repository, templates: T) -> Self {
        Self {
            repository,
            templates,
        }
    }

    /// Decode the merge view of the selected context
    pub fn create_rendering_context(&self, file: &FileToRender) -> Result<RenderingContext> {
        let current = self.repository.current()?;
        Ok(RenderingContext {
            context_name: current.name().to_string(),
            file: file.clone(),
            secrets: self.repository.secrets_map_decoded()?,
            configs: self.repository.config_map()?,
        })
    }

    /// Render `file` into `out`
    pub fn execute_template(
        &self,
        file: &FileToRender,
        out: &mut dyn Write,
    ) -> Result<RenderingContext> {
        let context = self.create_rendering_context(file)?;

        let source = fs::read_to_string(&file.file_in).map_err(|e| {
            SecretsError::Template(format!(
                "could not read template {}: {}",
                file.file_in.display(),
                e
            ))
        })?;
        let name = file
            .file_in
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(template = %name, context = %context.context_name, "rendering");
        self.templates.render(&name, &source, &context, out)?;
        Ok(context)
    }

    /// Render `file` to a string
    pub fn render_file(&self, file: &FileToRender) -> Result<(RenderingContext, String)> {
        let mut buffer = Vec::new();
        let context = self.execute_template(file, &mut buffer)?;
        let rendered = String::from_utf8(buffer)
            .map_err(|_| SecretsError::Template("rendered output is not valid UTF-8".into()))?;
        Ok((context, rendered))
    }

    /// Render `file` and replace its output file.
    ///
    /// The output is only opened once rendering succeeded.
    pub fn write_file(&self, file: &FileToRender) -> Result<RenderingContext> {
        let mut buffer = Vec::new();
        let context = self.execute_template(file, &mut buffer)?;

        fs::write(&file.file_out, &buffer).map_err(|e| {
            SecretsError::Io(std::io::Error::new(
                e.kind(),
                format!("could not write {}: {}", file.file_out.display(), e),
            ))
        })?;
        info!(file = %file.file_out.display(), "rendered");
        Ok(context)
    }
}
