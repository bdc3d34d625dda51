//! Persistence ports for `Envini`.
//!
//! This crate defines three narrow store traits ([`RepositoryStore`],
//! [`SecretStore`], [`AuditStore`]) that the vault engine in
//! `envini-core` is written against. They know nothing about encryption,
//! access control or the config-file format; payloads arrive already sealed.
//!
//! Implementations provided:
//!
//! - [`PostgresStore`]: production backend over `sqlx` (feature `postgres-backend`)
//! - [`MemoryStore`]: in-memory, for tests and local development
//! - [`FileAuditStore`]: append-only JSON-lines audit sink
//!
//! Every invariant that must hold across concurrent requests (natural-key
//! uniqueness, atomic version allocation) is enforced here, never by
//! in-process locking in the callers.

mod error;
mod file_audit;
mod memory;
pub mod models;
#[cfg(feature = "postgres-backend")]
mod postgres;

pub use error::StorageError;
pub use file_audit::FileAuditStore;
pub use memory::MemoryStore;
pub use models::{
    AuditLogEntry, NewAuditEntry, NewRepository, NewSecret, RepositoryRecord, SecretRecord,
};
#[cfg(feature = "postgres-backend")]
pub use postgres::PostgresStore;

/// Repository bookkeeping keyed by `(owner_login, repo_name)`.
#[async_trait::async_trait]
pub trait RepositoryStore: Send + Sync + 'static {
    /// Insert the repository, or overwrite its metadata if the natural key
    /// already exists, and return the stored record.
    ///
    /// Must be a single atomic upsert so concurrent identical calls converge
    /// on one row.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn upsert_repository(
        &self,
        repo: NewRepository,
    ) -> Result<RepositoryRecord, StorageError>;

    /// Look up a repository by its natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn find_repository(
        &self,
        owner_login: &str,
        repo_name: &str,
    ) -> Result<Option<RepositoryRecord>, StorageError>;

    /// List every known repository ordered by owner, then name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, StorageError>;
}

/// Immutable, versioned secret records.
///
/// Version numbers are per repository, start at 1, and are never reissued,
/// not even after the versions holding them are deleted.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// The version the next allocation would receive.
    ///
    /// Advisory only: another writer may claim it before the caller does.
    /// Uploads go through [`allocate_and_insert`](SecretStore::allocate_and_insert).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn next_version(&self, repo_id: i64) -> Result<i32, StorageError>;

    /// Insert a record under an explicit version.
    ///
    /// Advances the repository's high-water mark when `version` exceeds it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if `(repo_id, version)` already
    /// exists, [`StorageError::Write`] on backend failure.
    async fn insert_secret(
        &self,
        secret: NewSecret,
        version: i32,
    ) -> Result<SecretRecord, StorageError>;

    /// Allocate the next version and insert the record as one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] or [`StorageError::Write`] on
    /// backend failure. No version is consumed when the insert fails.
    async fn allocate_and_insert(&self, secret: NewSecret) -> Result<SecretRecord, StorageError>;

    /// Exact version lookup.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn get_by_version(
        &self,
        repo_id: i64,
        version: i32,
    ) -> Result<Option<SecretRecord>, StorageError>;

    /// Highest-versioned record carrying `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn get_by_tag(
        &self,
        repo_id: i64,
        tag: &str,
    ) -> Result<Option<SecretRecord>, StorageError>;

    /// Highest-versioned record regardless of tag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn get_latest(&self, repo_id: i64) -> Result<Option<SecretRecord>, StorageError>;

    /// All records for the repository, newest version first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn list_versions(&self, repo_id: i64) -> Result<Vec<SecretRecord>, StorageError>;

    /// Remove exactly one version. Returns the number of rows removed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the backend fails.
    async fn delete_version(&self, repo_id: i64, version: i32) -> Result<u64, StorageError>;

    /// Remove every version of the repository. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the backend fails.
    async fn delete_all(&self, repo_id: i64) -> Result<u64, StorageError>;
}

/// Append-only audit sink.
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync + 'static {
    /// The backend's name (for error reporting).
    fn name(&self) -> &str;

    /// Persist one entry. Entries are never updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be persisted.
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, StorageError>;
}
