//! Error types
//!
//! Four families, kept apart so callers can react differently:
//! validation (structural invariants), resolution (no key material),
//! cryptographic failures and lookups by name that found nothing.

use gitsecrets_core::ConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SecretsError>;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("the {kind} {name} does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("no context selected")]
    NoContextSelected,

    #[error("could not resolve secret: {0}")]
    Resolution(#[from] ResolveError),

    #[error("could not decode: {0}")]
    Crypto(#[from] CryptoError),

    #[error("secret {name} from context {context}: {source}")]
    Secret {
        name: String,
        context: String,
        #[source]
        source: Box<SecretsError>,
    },

    #[error("template error: {0}")]
    Template(String),

    #[error("git: {0}")]
    Git(String),

    #[error("global config: {0}")]
    Config(#[from] ConfigError),

    #[error("could not parse json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecretsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Attach the secret name and origin context to an error
    pub fn for_secret(self, name: &str, context: &str) -> Self {
        Self::Secret {
            name: name.to_string(),
            context: context.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through per-secret wrappers
    pub fn root(&self) -> &SecretsError {
        match self {
            Self::Secret { source, .. } => source.root(),
            other => other,
        }
    }
}

/// A secret resolver could not produce key material
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("the secret passed on the command line is empty, pass a non-empty --secret")]
    EmptyPlain,

    #[error("env variable {var} is not set or empty, export {var} with the AES key")]
    EnvUnset { var: String },

    #[error(
        "no global secret named {name}, configure it with 'git-secrets global-secret {name} <value>' or pass --global-secret {name}=<value>"
    )]
    NamedMissing { name: String },
}

/// Encryption or decryption failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("value is not valid base64")]
    InvalidBase64,

    #[error("encoded value is {len} bytes, smaller than the nonce size {nonce}")]
    TooShort { len: usize, nonce: usize },

    #[error("authentication failed, wrong key or tampered value")]
    Authentication,

    #[error("key of {0} bytes is not a valid AES key, use 16, 24 or 32 bytes")]
    InvalidKeyLength(usize),

    #[error("encryption failed")]
    Encrypt,

    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}
