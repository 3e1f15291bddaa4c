use std::path::PathBuf;

use super::context::{push_unique_output, FileToRender};
use crate::error::Result;

/// A named group of files rendered together, independent of contexts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub name: String,
    files: Vec<FileToRender>,
}

impl RenderTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    pub fn files(&self) -> &[FileToRender] {
        &self.files
    }

    /// Add a mapping; each output path may appear once per target
    pub fn add_file_to_render(
        &mut self,
        file_in: impl Into<PathBuf>,
        file_out: impl Into<PathBuf>,
    ) -> Result<()> {
        let owner = format!("target {}", self.name);
        push_unique_output(&mut self.files, FileToRender::new(file_in, file_out), &owner)
    }
}
