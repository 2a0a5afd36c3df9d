//! Cryptographic utilities for content at rest
//!
//! Every record's text is encrypted with AES-256-GCM before it touches
//! durable media. The nonce travels in the record's cleartext encryption
//! metadata (it is not secret); the key itself lives only in memory and is
//! never persisted alongside ciphertext.

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256-GCM encryption key size
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// In-memory master key for record content.
///
/// Zeroized on drop so key material does not linger after the engine shuts
/// down. The `key_ref` names the key in record metadata without revealing it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    #[zeroize(skip)]
    key_ref: String,
    key: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Generate a fresh random key with the given reference name
    pub fn generate(key_ref: impl Into<String>) -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            key_ref: key_ref.into(),
            key,
        }
    }

    /// Construct from existing key bytes (e.g. loaded from a keychain)
    pub fn from_bytes(key_ref: impl Into<String>, key: [u8; KEY_SIZE]) -> Self {
        Self {
            key_ref: key_ref.into(),
            key,
        }
    }

    /// Name of this key as recorded in encryption metadata
    pub fn key_ref(&self) -> &str {
        &self.key_ref
    }

    /// Encrypt plaintext, returning the ciphertext and the fresh nonce.
    ///
    /// The nonce must be stored with the record's metadata and supplied
    /// back to `decrypt`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

        Ok((ciphertext, nonce_bytes))
    }

    /// Decrypt ciphertext produced by `encrypt` with its stored nonce
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = MasterKey::generate("test-key");
        let plaintext = b"I keep vacation documents in drawer 2";

        let (ciphertext, nonce) = key.encrypt(plaintext).unwrap();
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());

        let decrypted = key.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let key1 = MasterKey::generate("k1");
        let key2 = MasterKey::generate("k2");

        let (ciphertext, nonce) = key1.encrypt(b"secret").unwrap();
        assert!(key2.decrypt(&ciphertext, &nonce).is_err());
    }

    #[test]
    fn test_decrypt_wrong_nonce() {
        let key = MasterKey::generate("k");
        let (ciphertext, _nonce) = key.encrypt(b"secret").unwrap();
        let wrong_nonce = [0u8; NONCE_SIZE];
        assert!(key.decrypt(&ciphertext, &wrong_nonce).is_err());
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let key = MasterKey::generate("k");
        let (_, n1) = key.encrypt(b"same input").unwrap();
        let (_, n2) = key.encrypt(b"same input").unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_key_ref() {
        let key = MasterKey::generate("vault-primary");
        assert_eq!(key.key_ref(), "vault-primary");
    }
}
