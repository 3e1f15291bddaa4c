//! git-secrets - encrypted per-project secrets and config
//!
//! A project keeps one JSON document (`.git-secrets.json`) next to its code.
//! The document declares contexts (`default`, `staging`, `prod`, ...), each
//! holding AES-GCM encrypted secrets and plain config values. Every context
//! other than `default` may only override keys that `default` declares, so a
//! merged view always resolves.
//!
//! Decoded values are substituted into templates by the rendering engine,
//! and the leak scanner checks files for plaintext copies of them.

pub mod encryption;
pub mod error;
pub mod render;
pub mod repository;
pub mod scan;
pub mod schema;

pub use encryption::{AesEngine, SecretOverrides, SecretResolver};
pub use error::{CryptoError, ResolveError, Result, SecretsError};
pub use render::{PlaceholderTemplate, RenderingContext, RenderingEngine, TemplateEngine};
pub use repository::{
    CliOverrides, Config, ConfigWriter, Context, FileToRender, RenderTarget, Repository, Secret,
    DEFAULT_CONTEXT_NAME,
};
pub use schema::{parse_repository, write_initial_config, V1Schema, V1Writer};
