//! AES-256-GCM primitives.
//!
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`.
//! - Ciphertext format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - [`EncryptionKey`] derives `Zeroize` + `ZeroizeOnDrop`.
//!
//! The envelope scheme in [`crate::envelope`] is built from these two calls.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// Minimum ciphertext length: 12-byte nonce + 16-byte AES-GCM tag.
const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + 16;

/// A 256-bit encryption key that is zeroized on drop.
///
/// Used both for the long-lived master key and for per-secret data keys.
/// The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a key from a slice that must be exactly 32 bytes long.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes. Never log or persist them unwrapped.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce.
///
/// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut combined = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if the input cannot hold a
/// nonce and a tag, and [`CryptoError::Decryption`] if authentication fails
/// (wrong key, corrupted data, or tampered tag).
pub fn decrypt(key: &EncryptionKey, combined: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if combined.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: MIN_CIPHERTEXT_LEN,
            actual: combined.len(),
        });
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let plaintext = b"DATABASE_URL=\"postgres://db\"";
        let ciphertext = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = EncryptionKey::generate();
        let ciphertext = encrypt(&key, b"").unwrap();
        assert_eq!(ciphertext.len(), MIN_CIPHERTEXT_LEN);
        assert!(decrypt(&key, &ciphertext).unwrap().is_empty());
    }

    #[test]
    fn decrypt_with_other_key_fails() {
        let ciphertext = encrypt(&EncryptionKey::generate(), b"secret").unwrap();
        let result = decrypt(&EncryptionKey::generate(), &ciphertext);
        assert!(matches!(result, Err(CryptoError::Decryption { .. })));
    }

    #[test]
    fn short_input_is_rejected_before_decrypting() {
        let key = EncryptionKey::generate();
        let result = decrypt(&key, &[0u8; 10]);
        assert!(matches!(
            result,
            Err(CryptoError::CiphertextTooShort {
                expected: 28,
                actual: 10
            })
        ));
    }

    #[test]
    fn tampered_nonce_fails() {
        let key = EncryptionKey::generate();
        let mut ciphertext = encrypt(&key, b"secret").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(decrypt(&key, &ciphertext).is_err());
    }

    #[test]
    fn fresh_nonce_per_call() {
        let key = EncryptionKey::generate();
        let ct1 = encrypt(&key, b"same data").unwrap();
        let ct2 = encrypt(&key, b"same data").unwrap();
        assert_ne!(ct1[..NONCE_LEN], ct2[..NONCE_LEN]);
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(EncryptionKey::from_slice(&[7u8; 32]).is_ok());
        assert!(matches!(
            EncryptionKey::from_slice(&[7u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn debug_redacts_bytes() {
        let key = EncryptionKey::from_bytes([0xAB; 32]);
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("171"));
    }
}
