//! Encryption for audit data at rest.
//!
//! Buffered audit events are encrypted with AES-256-GCM before they are
//! persisted locally or shipped to the remote sink.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The encryption key is invalid (wrong size or encoding).
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Corrupted or tampered ciphertext.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Trait for encrypting serialized audit payloads.
pub trait Encryptor: Send + Sync {
    /// Encrypts plaintext, returning a base64-encoded ciphertext.
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;

    /// Decrypts a base64-encoded ciphertext back to the original plaintext.
    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;
}

/// AES-256-GCM encryptor.
///
/// Ciphertext format: `base64(nonce || ciphertext || tag)` with a 12-byte
/// nonce and the 16-byte tag appended by aes-gcm.
pub struct Aes256GcmEncryptor {
    cipher: Aes256Gcm,
}

impl Aes256GcmEncryptor {
    pub fn new(key: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new_from_slice(&key).expect("32-byte key is always valid");
        Self { cipher }
    }

    /// Creates an encryptor from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_base64: &str) -> Result<Self, CryptoError> {
        let key_bytes = BASE64
            .decode(key_base64)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid base64: {}", e)))?;

        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(Self::new(key))
    }
}

impl Encryptor for Aes256GcmEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut combined = Vec::with_capacity(12 + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    fn decrypt(&self, ciphertext_base64: &str) -> Result<String, CryptoError> {
        let combined = BASE64
            .decode(ciphertext_base64)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {}", e)))?;

        // 12-byte nonce + 16-byte tag minimum
        if combined.len() < 28 {
            return Err(CryptoError::DecryptionFailed(
                "ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext_bytes = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed("decryption failed".to_string()))?;

        String::from_utf8(plaintext_bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
    }
}

/// No-op encryptor for development when no key is configured.
pub struct PlaintextEncryptor;

impl Encryptor for PlaintextEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        Ok(ciphertext.to_string())
    }
}

/// Creates the encryptor for the configured audit key.
///
/// With no key configured, audit data is persisted in plaintext and a
/// warning is emitted; production configs must always carry a key.
pub fn create_encryptor(key_base64: Option<&str>) -> Arc<dyn Encryptor> {
    match key_base64 {
        Some(key) => match Aes256GcmEncryptor::from_base64_key(key) {
            Ok(enc) => {
                tracing::info!("audit encryption enabled with AES-256-GCM");
                Arc::new(enc)
            }
            Err(e) => {
                tracing::error!("invalid audit encryption key: {}. Using plaintext storage", e);
                Arc::new(PlaintextEncryptor)
            }
        },
        None => {
            tracing::warn!(
                "no audit encryption key configured; audit data will be persisted in PLAINTEXT"
            );
            Arc::new(PlaintextEncryptor)
        }
    }
}

/// Generates a random 32-byte key, base64 encoded. For setup tooling.
pub fn generate_encryption_key() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill(&mut key);
    BASE64.encode(key)
}

/// Hex-encoded SHA-256 digest, used for payload checksums and IP hashing.
pub fn sha256_hex(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
