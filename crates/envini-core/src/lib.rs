//! Core library for `Envini`.
//!
//! Contains the envelope codec, the `.env` config codec, the access gate,
//! the audit logger, the repository registry and the [`Vault`] engine that
//! composes them. Persistence goes through the store traits of
//! `envini-storage`; this crate knows nothing about HTTP or SQL.

pub mod access;
pub mod audit;
pub mod crypto;
pub mod dotenv;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod vault;

pub use access::{AccessDecision, AccessGate, GitHubProvider, RepositoryProvider, UpstreamRepository};
pub use audit::{AuditLogger, AuditOperation, RequestContext};
pub use envelope::MasterKey;
pub use error::{ConfigError, CryptoError, ProviderError, ValidationError, VaultError};
pub use vault::{
    DeleteOutcome, DownloadedSecret, RepositoryVersions, UploadReceipt, Vault, VersionSummary,
};
