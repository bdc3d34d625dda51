//! In-memory store for testing and local development.
//!
//! All three store traits share one state behind a `tokio::sync::RwLock`.
//! Nothing is persistent; all data is lost when the process exits. Version
//! allocation holds the write lock across read-counter-and-insert, which is
//! what makes it atomic here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{
    AuditLogEntry, NewAuditEntry, NewRepository, NewSecret, RepositoryRecord, SecretRecord,
};
use crate::{AuditStore, RepositoryStore, SecretStore, StorageError};

#[derive(Debug, Default)]
struct State {
    /// Keyed by `(owner_login, repo_name)`.
    repositories: BTreeMap<(String, String), RepositoryRecord>,
    /// Keyed by `(repo_id, version)`.
    secrets: BTreeMap<(i64, i32), SecretRecord>,
    /// Highest version ever issued per repository.
    high_water: HashMap<i64, i32>,
    audit: Vec<AuditLogEntry>,
    last_repo_id: i64,
    last_secret_id: i64,
}

impl State {
    fn repo_exists(&self, repo_id: i64) -> bool {
        self.repositories.values().any(|r| r.id == repo_id)
    }

    fn insert(&mut self, secret: NewSecret, version: i32) -> Result<SecretRecord, StorageError> {
        // Same rule as the `CHECK (version > 0)` constraint in Postgres.
        if version <= 0 {
            return Err(StorageError::Write {
                what: format!("secret for repository {}", secret.repo_id),
                reason: format!("version must be positive, got {version}"),
            });
        }
        if !self.repo_exists(secret.repo_id) {
            return Err(StorageError::Write {
                what: format!("secret for repository {}", secret.repo_id),
                reason: "repository does not exist".to_owned(),
            });
        }
        if self.secrets.contains_key(&(secret.repo_id, version)) {
            return Err(StorageError::Conflict {
                what: format!(
                    "version {version} already exists for repository {}",
                    secret.repo_id
                ),
            });
        }

        self.last_secret_id = self.last_secret_id.saturating_add(1);
        let record = SecretRecord {
            id: self.last_secret_id,
            repo_id: secret.repo_id,
            version,
            tag: secret.tag,
            payload: secret.payload,
            checksum: secret.checksum,
            uploaded_by: secret.uploaded_by,
            created_at: Utc::now(),
            is_encrypted: secret.is_encrypted,
            wrapped_key: secret.wrapped_key,
        };

        let mark = self.high_water.entry(record.repo_id).or_insert(0);
        *mark = (*mark).max(version);
        self.secrets.insert((record.repo_id, version), record.clone());
        Ok(record)
    }

    fn versions_of(&self, repo_id: i64) -> impl DoubleEndedIterator<Item = &SecretRecord> {
        self.secrets
            .range((repo_id, i32::MIN)..=(repo_id, i32::MAX))
            .map(|(_, s)| s)
    }
}

/// An in-memory implementation of every store trait.
///
/// Cloning shares the underlying state.
///
/// # Examples
///
/// ```
/// # use envini_storage::{MemoryStore, NewRepository, RepositoryStore};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// let repo = store
///     .upsert_repository(NewRepository {
///         owner_login: "acme".into(),
///         repo_name: "widgets".into(),
///         upstream_id: 7,
///         full_name: "acme/widgets".into(),
///         html_url: "https://github.com/acme/widgets".into(),
///         description: String::new(),
///         is_private: true,
///     })
///     .await
///     .unwrap();
/// assert_eq!(repo.id, 1);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every audit entry appended so far, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.state.read().await.audit.clone()
    }

    /// Number of repositories known to the store.
    pub async fn repository_count(&self) -> usize {
        self.state.read().await.repositories.len()
    }

    /// Number of secret records across all repositories.
    pub async fn secret_count(&self) -> usize {
        self.state.read().await.secrets.len()
    }
}

#[async_trait::async_trait]
impl RepositoryStore for MemoryStore {
    async fn upsert_repository(
        &self,
        repo: NewRepository,
    ) -> Result<RepositoryRecord, StorageError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let key = (repo.owner_login.clone(), repo.repo_name.clone());

        if let Some(existing) = state.repositories.get_mut(&key) {
            existing.upstream_id = repo.upstream_id;
            existing.full_name = repo.full_name;
            existing.html_url = repo.html_url;
            existing.description = repo.description;
            existing.is_private = repo.is_private;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        state.last_repo_id = state.last_repo_id.saturating_add(1);
        let record = RepositoryRecord {
            id: state.last_repo_id,
            owner_login: repo.owner_login,
            repo_name: repo.repo_name,
            upstream_id: repo.upstream_id,
            full_name: repo.full_name,
            html_url: repo.html_url,
            description: repo.description,
            is_private: repo.is_private,
            created_at: now,
            updated_at: now,
        };
        state.repositories.insert(key, record.clone());
        Ok(record)
    }

    async fn find_repository(
        &self,
        owner_login: &str,
        repo_name: &str,
    ) -> Result<Option<RepositoryRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .repositories
            .get(&(owner_login.to_owned(), repo_name.to_owned()))
            .cloned())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state.repositories.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl SecretStore for MemoryStore {
    async fn next_version(&self, repo_id: i64) -> Result<i32, StorageError> {
        let state = self.state.read().await;
        let mark = state.high_water.get(&repo_id).copied().unwrap_or(0);
        Ok(mark.saturating_add(1))
    }

    async fn insert_secret(
        &self,
        secret: NewSecret,
        version: i32,
    ) -> Result<SecretRecord, StorageError> {
        let mut state = self.state.write().await;
        state.insert(secret, version)
    }

    async fn allocate_and_insert(&self, secret: NewSecret) -> Result<SecretRecord, StorageError> {
        let mut state = self.state.write().await;
        let next = state
            .high_water
            .get(&secret.repo_id)
            .copied()
            .unwrap_or(0)
            .saturating_add(1);
        state.insert(secret, next)
    }

    async fn get_by_version(
        &self,
        repo_id: i64,
        version: i32,
    ) -> Result<Option<SecretRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state.secrets.get(&(repo_id, version)).cloned())
    }

    async fn get_by_tag(
        &self,
        repo_id: i64,
        tag: &str,
    ) -> Result<Option<SecretRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .versions_of(repo_id)
            .rev()
            .find(|s| s.tag == tag)
            .cloned())
    }

    async fn get_latest(&self, repo_id: i64) -> Result<Option<SecretRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state.versions_of(repo_id).next_back().cloned())
    }

    async fn list_versions(&self, repo_id: i64) -> Result<Vec<SecretRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state.versions_of(repo_id).rev().cloned().collect())
    }

    async fn delete_version(&self, repo_id: i64, version: i32) -> Result<u64, StorageError> {
        let mut state = self.state.write().await;
        Ok(u64::from(state.secrets.remove(&(repo_id, version)).is_some()))
    }

    async fn delete_all(&self, repo_id: i64) -> Result<u64, StorageError> {
        let mut state = self.state.write().await;
        let before = state.secrets.len();
        state.secrets.retain(|(id, _), _| *id != repo_id);
        let removed = before.saturating_sub(state.secrets.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

#[async_trait::async_trait]
impl AuditStore for MemoryStore {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, StorageError> {
        let entry = entry.into_entry();
        self.state.write().await.audit.push(entry.clone());
        Ok(entry)
    }
}
