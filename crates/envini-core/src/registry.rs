//! Repository bookkeeping.
//!
//! Thin layer over [`RepositoryStore`] that maps upstream metadata onto the
//! stored record. Creation and metadata refresh are one atomic upsert, so
//! concurrent first uploads to the same repository converge on one row.

use std::sync::Arc;

use envini_storage::{NewRepository, RepositoryRecord, RepositoryStore, StorageError};

use crate::access::UpstreamRepository;

#[derive(Clone)]
pub struct RepositoryRegistry {
    store: Arc<dyn RepositoryStore>,
}

impl RepositoryRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn RepositoryStore>) -> Self {
        Self { store }
    }

    /// Create the record for `upstream`, or refresh its metadata.
    ///
    /// # Errors
    ///
    /// Returns the store's [`StorageError`].
    pub async fn get_or_create(
        &self,
        upstream: &UpstreamRepository,
    ) -> Result<RepositoryRecord, StorageError> {
        self.store
            .upsert_repository(NewRepository {
                owner_login: upstream.owner_login.clone(),
                repo_name: upstream.name.clone(),
                upstream_id: upstream.id,
                full_name: upstream.full_name.clone(),
                html_url: upstream.html_url.clone(),
                description: upstream.description.clone(),
                is_private: upstream.is_private,
            })
            .await
    }

    /// # Errors
    ///
    /// Returns the store's [`StorageError`].
    pub async fn find(
        &self,
        owner_login: &str,
        repo_name: &str,
    ) -> Result<Option<RepositoryRecord>, StorageError> {
        self.store.find_repository(owner_login, repo_name).await
    }

    /// # Errors
    ///
    /// Returns the store's [`StorageError`].
    pub async fn list(&self) -> Result<Vec<RepositoryRecord>, StorageError> {
        self.store.list_repositories().await
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry").finish_non_exhaustive()
    }
}
