//! Persistent record types.
//!
//! Plain data only. Records are created and read through the store traits
//! in the crate root; nothing here talks to a backend. A [`SecretRecord`]
//! is immutable once written: stores only ever read or delete it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Repositories ─────────────────────────────────────────────────────

/// A repository known to the vault, keyed by `(owner_login, repo_name)`.
///
/// The metadata fields are denormalized copies of the upstream listing and
/// are refreshed on every successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct RepositoryRecord {
    pub id: i64,
    pub owner_login: String,
    pub repo_name: String,
    /// Repository id assigned by the upstream provider.
    pub upstream_id: i64,
    pub full_name: String,
    pub html_url: String,
    pub description: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert/update payload for [`crate::RepositoryStore::upsert_repository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub owner_login: String,
    pub repo_name: String,
    pub upstream_id: i64,
    pub full_name: String,
    pub html_url: String,
    pub description: String,
    pub is_private: bool,
}

// ── Secrets ──────────────────────────────────────────────────────────

/// One immutable secret version.
///
/// When `is_encrypted` is set, `payload` and `wrapped_key` are base64 text
/// produced by the envelope codec. Otherwise `payload` is the plaintext
/// content and `wrapped_key` is `None`.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct SecretRecord {
    pub id: i64,
    pub repo_id: i64,
    pub version: i32,
    pub tag: String,
    pub payload: String,
    /// Hex SHA-256 of the bytes originally uploaded.
    pub checksum: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    pub is_encrypted: bool,
    pub wrapped_key: Option<String>,
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("id", &self.id)
            .field("repo_id", &self.repo_id)
            .field("version", &self.version)
            .field("tag", &self.tag)
            .field("payload", &"[REDACTED]")
            .field("checksum", &self.checksum)
            .field("uploaded_by", &self.uploaded_by)
            .field("created_at", &self.created_at)
            .field("is_encrypted", &self.is_encrypted)
            .finish_non_exhaustive()
    }
}

/// Insert payload for a secret version. The version itself is supplied by
/// the store (or explicitly by the caller of
/// [`crate::SecretStore::insert_secret`]).
#[derive(Clone, PartialEq, Eq)]
pub struct NewSecret {
    pub repo_id: i64,
    pub tag: String,
    pub payload: String,
    pub checksum: String,
    pub uploaded_by: String,
    pub is_encrypted: bool,
    pub wrapped_key: Option<String>,
}

impl std::fmt::Debug for NewSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewSecret")
            .field("repo_id", &self.repo_id)
            .field("tag", &self.tag)
            .field("checksum", &self.checksum)
            .field("uploaded_by", &self.uploaded_by)
            .field("is_encrypted", &self.is_encrypted)
            .finish_non_exhaustive()
    }
}

// ── Audit ────────────────────────────────────────────────────────────

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub operation: String,
    pub repo_id: Option<i64>,
    pub secret_id: Option<i64>,
    pub actor: String,
    pub correlation_id: String,
    pub service_name: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append payload for [`crate::AuditStore::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub operation: String,
    pub repo_id: Option<i64>,
    pub secret_id: Option<i64>,
    pub actor: String,
    pub correlation_id: String,
    pub service_name: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewAuditEntry {
    /// Stamp the entry with an id and timestamp.
    #[must_use]
    pub fn into_entry(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            operation: self.operation,
            repo_id: self.repo_id,
            secret_id: self.secret_id,
            actor: self.actor,
            correlation_id: self.correlation_id,
            service_name: self.service_name,
            remote_addr: self.remote_addr,
            user_agent: self.user_agent,
            success: self.success,
            error_message: self.error_message,
            created_at: Utc::now(),
        }
    }
}
