//! AES-GCM engine
//!
//! The key size picks the cipher: 16 bytes AES-128, 24 bytes AES-192,
//! 32 bytes AES-256. Every encode draws a fresh random 96-bit nonce from
//! the OS and prepends it to the ciphertext.

use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit, OsRng},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use rand::RngCore;

use super::resolver::SecretResolver;
use crate::error::{CryptoError, Result};

/// Size of the AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

enum Cipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl Cipher {
    fn from_key(key: &[u8]) -> std::result::Result<Self, CryptoError> {
        let invalid = |_| CryptoError::InvalidKeyLength(key.len());
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192Gcm::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256Gcm::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    fn seal(&self, nonce: &[u8], plaintext: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::<U12>::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes192(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|_| CryptoError::Encrypt)
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::<U12>::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes192(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CryptoError::Authentication)
    }
}

/// Generate a random nonce
fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encryption engine bound to one secret resolver.
///
/// Holds no per-call state, so a shared reference can decode from many
/// threads at once.
#[derive(Debug, Clone)]
pub struct AesEngine {
    resolver: SecretResolver,
}

impl AesEngine {
    pub fn new(resolver: SecretResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &SecretResolver {
        &self.resolver
    }

    fn cipher(&self) -> Result<Cipher> {
        let key = self.resolver.plain_secret()?;
        Ok(Cipher::from_key(&key)?)
    }

    /// Seal `plaintext`, returning `nonce || ciphertext || tag`
    pub fn encode_value(&self, plaintext: &str) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;
        let nonce = generate_nonce();
        let sealed = cipher.seal(&nonce, plaintext.as_bytes())?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open a value produced by [`AesEngine::encode_value`]
    pub fn decode_value(&self, encoded: &[u8]) -> Result<String> {
        let cipher = self.cipher()?;

        if encoded.len() < NONCE_SIZE {
            return Err(CryptoError::TooShort {
                len: encoded.len(),
                nonce: NONCE_SIZE,
            }
            .into());
        }

        let (nonce, ciphertext) = encoded.split_at(NONCE_SIZE);
        let plain = cipher.open(nonce, ciphertext)?;
        String::from_utf8(plain).map_err(|_| CryptoError::InvalidUtf8.into())
    }
}
