//! Symmetric encryption of secret values
//!
//! A [`SecretResolver`] produces the raw AES key for a context; an
//! [`AesEngine`] bound to that resolver seals and opens values with
//! AES-GCM. Sealed values are `nonce || ciphertext || tag`.

pub mod engine;
pub mod resolver;

pub use engine::{AesEngine, NONCE_SIZE};
pub use resolver::{SecretOverrides, SecretResolver};
