//! Error types for `envini-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Crypto errors never include key material, and nothing here
//! ever carries a payload or an identity token.

use envini_storage::StorageError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// An unwrapped data key does not have the AES-256 key length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Persisted ciphertext or wrapped key is not valid base64.
    #[error("malformed {what}: {reason}")]
    Encoding { what: &'static str, reason: String },
}

/// Errors from process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The master key is absent or does not decode to 32 bytes.
    #[error("master key unusable: {reason}")]
    MasterKey { reason: String },

    /// A setting is present but cannot be used.
    #[error("invalid configuration {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Errors from validating uploaded content or request fields.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Config-file content is not UTF-8 text.
    #[error("content is not valid UTF-8: {reason}")]
    NotUtf8 { reason: String },

    /// Config-file content exceeds the upload limit.
    #[error("content is {actual} bytes, limit is {limit}")]
    TooLarge { limit: usize, actual: usize },

    /// A required request field is empty.
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// A request field or body that could not be read at all.
    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    /// A version number outside the accepted range.
    #[error("version must not be negative, got {version}")]
    InvalidVersion { version: i32 },
}

/// Errors from the upstream repository provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned status {status}")]
    Status { status: u16 },

    /// The request never completed (connect, TLS, timeout).
    #[error("provider request failed: {reason}")]
    Transport { reason: String },

    /// The response body could not be decoded.
    #[error("failed to decode provider response: {reason}")]
    Decode { reason: String },
}

/// Errors surfaced by [`crate::Vault`] operations.
///
/// Every variant is an expected outcome returned as a value. Use
/// [`VaultError::kind`] for a stable machine-readable code.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The repository is absent from the caller's live upstream listing.
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    /// The upstream listing could not be obtained. Treated as a denial.
    #[error("upstream unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    /// Repository or secret version absent from the store.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Master key or other process configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Authentication-tag mismatch or malformed ciphertext.
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// Malformed request or config-file content.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store failed to read or write.
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
}

impl VaultError {
    /// Stable snake_case code used in audit messages and HTTP bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccessDenied { .. } => "access_denied",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::NotFound { .. } => "not_found",
            Self::Configuration(_) => "configuration_error",
            Self::Crypto(_) => "crypto_failure",
            Self::Validation(_) => "validation_error",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// The text written to the audit trail: `kind: message`.
    #[must_use]
    pub fn audit_message(&self) -> String {
        format!("{}: {self}", self.kind())
    }
}

impl From<ProviderError> for VaultError {
    fn from(err: ProviderError) -> Self {
        Self::UpstreamUnavailable {
            reason: err.to_string(),
        }
    }
}
