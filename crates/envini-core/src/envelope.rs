//! Envelope encryption.
//!
//! Each payload is encrypted under a fresh random data key, and that data key
//! is encrypted ("wrapped") under the long-lived [`MasterKey`]. The master key
//! never touches a payload directly. Both halves use the AES-256-GCM wire
//! format from [`crate::crypto`] and are persisted as base64 text.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptionKey, KEY_LEN};
use crate::error::{ConfigError, CryptoError};

/// Environment variable holding the base64 master key.
pub const MASTER_KEY_ENV: &str = "ENVINI_MASTER_KEY";

/// Older name for [`MASTER_KEY_ENV`], read when the primary one is unset.
pub const LEGACY_MASTER_KEY_ENV: &str = "MASTER_ENCRYPTION_KEY";

/// The process-wide key that wraps every data key.
///
/// Loaded once at startup and held for the process lifetime. Zeroized on
/// drop; `Debug` output is redacted.
#[derive(Clone)]
pub struct MasterKey(EncryptionKey);

impl MasterKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(EncryptionKey::from_bytes(bytes))
    }

    /// Generate a random master key (tests and first-time setup).
    #[must_use]
    pub fn generate() -> Self {
        Self(EncryptionKey::generate())
    }

    /// Decode a base64 (standard alphabet) master key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MasterKey`] if the text is blank, is not
    /// base64, or does not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(ConfigError::MasterKey {
                reason: "value is empty".to_owned(),
            });
        }

        let bytes = Zeroizing::new(BASE64.decode(encoded).map_err(|e| {
            ConfigError::MasterKey {
                reason: format!("not valid base64: {e}"),
            }
        })?);

        let key = EncryptionKey::from_slice(&bytes).map_err(|_| ConfigError::MasterKey {
            reason: format!("decodes to {} bytes, expected {KEY_LEN}", bytes.len()),
        })?;
        Ok(Self(key))
    }

    /// Load the master key from [`MASTER_KEY_ENV`], falling back to
    /// [`LEGACY_MASTER_KEY_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MasterKey`] if neither variable is set or the
    /// value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(
            std::env::var(MASTER_KEY_ENV).ok(),
            std::env::var(LEGACY_MASTER_KEY_ENV).ok(),
        )
    }

    /// Load from already-read variable values: `primary`, or `legacy` when
    /// `primary` is absent or blank.
    ///
    /// # Errors
    ///
    /// As [`MasterKey::from_env`].
    pub fn from_sources(
        primary: Option<String>,
        legacy: Option<String>,
    ) -> Result<Self, ConfigError> {
        let value = primary
            .filter(|v| !v.trim().is_empty())
            .or(legacy)
            .map(Zeroizing::new)
            .ok_or_else(|| ConfigError::MasterKey {
                reason: format!("{MASTER_KEY_ENV} is not set"),
            })?;
        Self::from_base64(&value)
    }

    fn key(&self) -> &EncryptionKey {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MasterKey").field(&"[REDACTED]").finish()
    }
}

/// Output of [`seal`]: the encrypted payload and its wrapped data key.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
}

impl SealedPayload {
    /// Persisted text form: `(ciphertext, wrapped_key)` as base64.
    #[must_use]
    pub fn to_base64(&self) -> (String, String) {
        (BASE64.encode(&self.ciphertext), BASE64.encode(&self.wrapped_key))
    }

    /// Parse the persisted text form.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encoding`] if either half is not valid base64.
    pub fn from_base64(ciphertext: &str, wrapped_key: &str) -> Result<Self, CryptoError> {
        let ciphertext = BASE64
            .decode(ciphertext)
            .map_err(|e| CryptoError::Encoding {
                what: "ciphertext",
                reason: e.to_string(),
            })?;
        let wrapped_key = BASE64
            .decode(wrapped_key)
            .map_err(|e| CryptoError::Encoding {
                what: "wrapped key",
                reason: e.to_string(),
            })?;
        Ok(Self {
            ciphertext,
            wrapped_key,
        })
    }
}

impl fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("wrapped_key_len", &self.wrapped_key.len())
            .finish()
    }
}

/// Encrypt `plaintext` under a fresh data key and wrap that key under `master`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if either AEAD operation fails.
pub fn seal(plaintext: &[u8], master: &MasterKey) -> Result<SealedPayload, CryptoError> {
    let data_key = EncryptionKey::generate();
    let ciphertext = crypto::encrypt(&data_key, plaintext)?;
    let wrapped_key = crypto::encrypt(master.key(), data_key.as_bytes())?;
    Ok(SealedPayload {
        ciphertext,
        wrapped_key,
    })
}

/// Unwrap the data key with `master`, then decrypt the payload.
///
/// Nothing is returned unless both authentication tags verify.
///
/// # Errors
///
/// Returns a [`CryptoError`] on any tag mismatch, truncated input, or a
/// wrapped key that does not unwrap to 32 bytes.
pub fn open(sealed: &SealedPayload, master: &MasterKey) -> Result<Vec<u8>, CryptoError> {
    let raw_key = Zeroizing::new(crypto::decrypt(master.key(), &sealed.wrapped_key)?);
    let data_key = EncryptionKey::from_slice(&raw_key)?;
    crypto::decrypt(&data_key, &sealed.ciphertext)
}
