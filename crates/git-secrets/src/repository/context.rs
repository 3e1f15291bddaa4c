//! Contexts and file mappings

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::path::PathBuf;

use crate::encryption::{AesEngine, SecretResolver};
use crate::error::{CryptoError, Result, SecretsError};

/// An input template and the file it renders to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileToRender {
    pub file_in: PathBuf,
    pub file_out: PathBuf,
}

impl FileToRender {
    pub fn new(file_in: impl Into<PathBuf>, file_out: impl Into<PathBuf>) -> Self {
        Self {
            file_in: file_in.into(),
            file_out: file_out.into(),
        }
    }
}

/// Append `file` unless its output path is already taken
pub(crate) fn push_unique_output(
    files: &mut Vec<FileToRender>,
    file: FileToRender,
    owner: &str,
) -> Result<()> {
    if files.iter().any(|f| f.file_out == file.file_out) {
        return Err(SecretsError::validation(format!(
            "output file {} is already defined on {}",
            file.file_out.display(),
            owner
        )));
    }
    files.push(file);
    Ok(())
}

/// A named scope of secrets and configs with its own decryption key
#[derive(Debug, Clone)]
pub struct Context {
    name: String,
    engine: AesEngine,
    files_to_render: Vec<FileToRender>,
}

impl Context {
    pub fn new(name: impl Into<String>, resolver: SecretResolver) -> Self {
        Self {
            name: name.into(),
            engine: AesEngine::new(resolver),
            files_to_render: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&self) -> &SecretResolver {
        self.engine.resolver()
    }

    pub fn files_to_render(&self) -> &[FileToRender] {
        &self.files_to_render
    }

    /// Replace the key source; the engine is rebuilt around it
    pub fn set_resolver(&mut self, resolver: SecretResolver) {
        self.engine = AesEngine::new(resolver);
    }

    /// Encrypt a value for storage, base64 encoded
    pub fn encode_value(&self, plain: &str) -> Result<String> {
        let sealed = self.engine.encode_value(plain)?;
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a base64 encoded value
    pub fn decode_value(&self, encoded: &str) -> Result<String> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidBase64)?;
        self.engine.decode_value(&raw)
    }

    /// Legacy per-context render mapping
    pub fn add_file_to_render(
        &mut self,
        file_in: impl Into<PathBuf>,
        file_out: impl Into<PathBuf>,
    ) -> Result<()> {
        let owner = format!("context {}", self.name);
        push_unique_output(
            &mut self.files_to_render,
            FileToRender::new(file_in, file_out),
            &owner,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "aju1ZieThohngii4eem4saeCh2fieral";

    #[test]
    fn test_encode_decode_roundtrip() {
        let ctx = Context::new("default", SecretResolver::plain(KEY));
        let encoded = ctx.encode_value("hello world").unwrap();

        assert!(STANDARD.decode(&encoded).is_ok());
        assert_eq!(ctx.decode_value(&encoded).unwrap(), "hello world");
    }

    #[test]
    fn test_decode_rejects_non_base64() {
        let ctx = Context::new("default", SecretResolver::plain(KEY));
        let err = ctx.decode_value("not base64 at all!").unwrap_err();
        assert!(matches!(err, SecretsError::Crypto(CryptoError::InvalidBase64)));
    }

    #[test]
    fn test_decode_rejects_short_value() {
        let ctx = Context::new("default", SecretResolver::plain(KEY));
        let short = STANDARD.encode(b"tiny");
        let err = ctx.decode_value(&short).unwrap_err();
        assert!(matches!(
            err,
            SecretsError::Crypto(CryptoError::TooShort { len: 4, .. })
        ));
    }

    #[test]
    fn test_set_resolver_changes_key() {
        let mut ctx = Context::new("default", SecretResolver::plain(KEY));
        let encoded = ctx.encode_value("value").unwrap();

        ctx.set_resolver(SecretResolver::plain("0123456789abcdef"));
        assert!(matches!(
            ctx.decode_value(&encoded),
            Err(SecretsError::Crypto(CryptoError::Authentication))
        ));
    }

    #[test]
    fn test_add_file_to_render_rejects_duplicate_output() {
        let mut ctx = Context::new("default", SecretResolver::plain(KEY));
        ctx.add_file_to_render("a.tpl", "a.out").unwrap();
        ctx.add_file_to_render("b.tpl", "b.out").unwrap();

        let err = ctx.add_file_to_render("c.tpl", "a.out").unwrap_err();
        assert!(matches!(err, SecretsError::Validation(_)));
        assert_eq!(ctx.files_to_render().len(), 2);
    }
}
