//! AES-256-GCM encryption of stored OAuth tokens.
//!
//! Ciphertext format: base64(nonce || ciphertext), where the nonce is 12 bytes
//! and the ciphertext carries the 16-byte authentication tag.

use std::fmt;
use std::string::FromUtf8Error;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::Rng;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum DecryptionError {
    #[error("Ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Ciphertext is too short")]
    Truncated,
    #[error("Ciphertext failed authentication (wrong key or tampered data)")]
    Authentication,
    #[error("Decrypted token is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to encrypt token")]
pub struct EncryptionError;

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Arc<Aes256Gcm>,
    ephemeral: bool,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Build a cipher from key material of any length; it is stretched to
    /// 256 bits with SHA-256.
    pub fn new(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Self::from_bytes(digest.into(), false)
    }

    /// Random key that lives only as long as the process. Tokens encrypted with
    /// it cannot be read after a restart, so this is for development only.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill(&mut key);
        Self::from_bytes(key, true)
    }

    /// Use the configured key, or fall back to an ephemeral one with a warning.
    pub fn from_key(key: Option<&str>) -> Self {
        match key.filter(|k| !k.is_empty()) {
            Some(key) => Self::new(key),
            None => {
                tracing::warn!(
                    "No token encryption key configured; generated an ephemeral development key. \
                     Stored credentials will be unreadable after a restart."
                );
                Self::ephemeral()
            }
        }
    }

    fn from_bytes(key: [u8; 32], ephemeral: bool) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key);
        Self {
            cipher: Arc::new(Aes256Gcm::new(key)),
            ephemeral,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn encrypt(&self, plain: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plain.as_bytes())
            .map_err(|_| EncryptionError)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, DecryptionError> {
        let combined = STANDARD.decode(encoded)?;
        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(DecryptionError::Truncated);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| DecryptionError::Authentication)?;

        Ok(String::from_utf8(plaintext)?)
    }
}
