//! Secret resolvers - where a context's AES key comes from

use crate::error::ResolveError;
use gitsecrets_core::GlobalConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Named secrets passed on the command line (`--global-secret name=value`)
pub type SecretOverrides = BTreeMap<String, String>;

/// Strategy producing the raw key bytes of a context
#[derive(Clone)]
pub enum SecretResolver {
    /// A key given directly, e.g. `--secret`
    Plain { secret: String },

    /// A key read from an environment variable
    Env { var: String },

    /// A named key: command line overrides first, then the global config
    Named {
        name: String,
        overrides: Arc<SecretOverrides>,
        global: Arc<GlobalConfig>,
    },
}

impl SecretResolver {
    pub fn plain(secret: impl Into<String>) -> Self {
        Self::Plain {
            secret: secret.into(),
        }
    }

    pub fn env(var: impl Into<String>) -> Self {
        Self::Env { var: var.into() }
    }

    pub fn named(
        name: impl Into<String>,
        overrides: Arc<SecretOverrides>,
        global: Arc<GlobalConfig>,
    ) -> Self {
        Self::Named {
            name: name.into(),
            overrides,
            global,
        }
    }

    /// Resolve the key bytes. Never succeeds with an empty key.
    pub fn plain_secret(&self) -> Result<Zeroizing<Vec<u8>>, ResolveError> {
        match self {
            Self::Plain { secret } => {
                if secret.is_empty() {
                    return Err(ResolveError::EmptyPlain);
                }
                Ok(Zeroizing::new(secret.as_bytes().to_vec()))
            }
            Self::Env { var } => match std::env::var(var) {
                Ok(value) if !value.is_empty() => Ok(Zeroizing::new(value.into_bytes())),
                _ => Err(ResolveError::EnvUnset { var: var.clone() }),
            },
            Self::Named {
                name,
                overrides,
                global,
            } => {
                if let Some(value) = overrides.get(name).filter(|v| !v.is_empty()) {
                    return Ok(Zeroizing::new(value.as_bytes().to_vec()));
                }
                global
                    .secret(name)
                    .map(|value| Zeroizing::new(value.into_bytes()))
                    .ok_or_else(|| ResolveError::NamedMissing { name: name.clone() })
            }
        }
    }

    /// Short human readable description of the decrypt method
    pub fn describe(&self) -> String {
        match self {
            Self::Plain { .. } => "plain secret".to_string(),
            Self::Env { var } => format!("env {}", var),
            Self::Named { name, .. } => format!("global secret {}", name),
        }
    }
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { .. } => f.debug_struct("Plain").finish_non_exhaustive(),
            Self::Env { var } => f.debug_struct("Env").field("var", var).finish(),
            Self::Named {
                name, overrides, ..
            } => f
                .debug_struct("Named")
                .field("name", name)
                .field("overrides", &overrides.keys().collect::<Vec<_>>())
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_with_secrets() -> Arc<GlobalConfig> {
        let mut global = GlobalConfig::in_memory();
        global
            .set_secret("overwritten", "riz9ohg9IefeeG8sha0quoa6it6uan6b", false)
            .unwrap();
        global
            .set_secret("original", "Ohqu7lahn4AiQu3reecoo1ausoo7aiy0", false)
            .unwrap();
        Arc::new(global)
    }

    fn overrides() -> Arc<SecretOverrides> {
        let mut map = SecretOverrides::new();
        map.insert(
            "overwritten".to_string(),
            "iepheam7aech9Wah5ahng5aix5Thumai".to_string(),
        );
        Arc::new(map)
    }

    #[test]
    fn test_plain_resolver() {
        let sr = SecretResolver::plain("value");
        assert_eq!(sr.plain_secret().unwrap().as_slice(), b"value");
    }

    #[test]
    fn test_plain_resolver_rejects_empty() {
        let sr = SecretResolver::plain("");
        assert_eq!(sr.plain_secret().unwrap_err(), ResolveError::EmptyPlain);
    }

    #[test]
    fn test_env_resolver() {
        std::env::set_var("GIT_SECRETS_TEST_RESOLVER_ENV", "value");
        let sr = SecretResolver::env("GIT_SECRETS_TEST_RESOLVER_ENV");
        assert_eq!(sr.plain_secret().unwrap().as_slice(), b"value");
    }

    #[test]
    fn test_env_resolver_unset() {
        let sr = SecretResolver::env("GIT_SECRETS_TEST_RESOLVER_MISSING");
        let err = sr.plain_secret().unwrap_err();
        assert!(err.to_string().contains("GIT_SECRETS_TEST_RESOLVER_MISSING"));
    }

    #[test]
    fn test_env_resolver_empty() {
        std::env::set_var("GIT_SECRETS_TEST_RESOLVER_EMPTY", "");
        let sr = SecretResolver::env("GIT_SECRETS_TEST_RESOLVER_EMPTY");
        assert!(matches!(
            sr.plain_secret(),
            Err(ResolveError::EnvUnset { .. })
        ));
    }

    #[test]
    fn test_named_resolver_prefers_override() {
        let sr = SecretResolver::named("overwritten", overrides(), global_with_secrets());
        assert_eq!(
            sr.plain_secret().unwrap().as_slice(),
            b"iepheam7aech9Wah5ahng5aix5Thumai"
        );
    }

    #[test]
    fn test_named_resolver_falls_back_to_global() {
        let sr = SecretResolver::named("original", overrides(), global_with_secrets());
        assert_eq!(
            sr.plain_secret().unwrap().as_slice(),
            b"Ohqu7lahn4AiQu3reecoo1ausoo7aiy0"
        );
    }

    #[test]
    fn test_named_resolver_missing() {
        let sr = SecretResolver::named("missing", overrides(), global_with_secrets());
        let err = sr.plain_secret().unwrap_err();
        assert_eq!(
            err,
            ResolveError::NamedMissing {
                name: "missing".to_string()
            }
        );
        assert!(err.to_string().contains("global-secret missing"));
    }

    #[test]
    fn test_override_match_is_exact() {
        let sr = SecretResolver::named("OVERWRITTEN", overrides(), global_with_secrets());
        // No exact override for the upper case name, so the global store answers.
        assert_eq!(
            sr.plain_secret().unwrap().as_slice(),
            b"riz9ohg9IefeeG8sha0quoa6it6uan6b"
        );
    }

    #[test]
    fn test_debug_never_prints_key() {
        let sr = SecretResolver::plain("supersecretvalue");
        assert!(!format!("{:?}", sr).contains("supersecretvalue"));

        let sr = SecretResolver::named("overwritten", overrides(), global_with_secrets());
        let debug = format!("{:?}", sr);
        assert!(debug.contains("overwritten"));
        assert!(!debug.contains("iepheam7aech9Wah5ahng5aix5Thumai"));
    }
}
