//! The vault engine.
//!
//! [`Vault`] composes the access gate, repository registry, secret store,
//! envelope codec and audit logger into the public operations. Each
//! operation is a linear pipeline that stops at the first failing stage.
//! Whatever the outcome, exactly one audit entry is written before the
//! result is returned.
//!
//! The engine keeps no state between calls apart from the master key.
//! Cross-request invariants (unique natural keys, version allocation) are
//! enforced by the stores.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use envini_storage::{NewSecret, RepositoryRecord, RepositoryStore, SecretRecord, SecretStore};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::access::{AccessGate, UpstreamRepository, find_in_listing};
use crate::audit::{AuditLogger, AuditOperation, AuditTarget, RequestContext};
use crate::dotenv;
use crate::envelope::{self, MasterKey, SealedPayload};
use crate::error::{CryptoError, ValidationError, VaultError};
use crate::registry::RepositoryRegistry;

/// `deleted` value reported when every version was removed.
pub const DELETED_ALL: i64 = -1;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub version: i32,
    pub tag: String,
    /// Hex SHA-256 of the bytes as uploaded.
    pub checksum: String,
}

/// A decrypted secret version.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedSecret {
    /// Canonical `KEY="value"` text.
    pub content: String,
    pub version: i32,
    pub tag: String,
    pub checksum: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    pub is_encrypted: bool,
}

impl std::fmt::Debug for DownloadedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadedSecret")
            .field("content", &"[REDACTED]")
            .field("version", &self.version)
            .field("tag", &self.tag)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// Metadata of one version, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSummary {
    pub version: i32,
    pub tag: String,
    pub checksum: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    pub is_encrypted: bool,
}

impl From<&SecretRecord> for VersionSummary {
    fn from(record: &SecretRecord) -> Self {
        Self {
            version: record.version,
            tag: record.tag.clone(),
            checksum: record.checksum.clone(),
            uploaded_by: record.uploaded_by.clone(),
            created_at: record.created_at,
            is_encrypted: record.is_encrypted,
        }
    }
}

/// A stored repository with its version history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryVersions {
    #[serde(flatten)]
    pub repository: RepositoryRecord,
    pub versions: Vec<VersionSummary>,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// `1` for a single version, [`DELETED_ALL`] for the whole history.
    pub deleted: i64,
}

/// The vault engine. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct Vault {
    registry: RepositoryRegistry,
    secrets: Arc<dyn SecretStore>,
    gate: AccessGate,
    audit: AuditLogger,
    master_key: MasterKey,
}

impl Vault {
    #[must_use]
    pub fn new(
        repositories: Arc<dyn RepositoryStore>,
        secrets: Arc<dyn SecretStore>,
        gate: AccessGate,
        audit: AuditLogger,
        master_key: MasterKey,
    ) -> Self {
        Self {
            registry: RepositoryRegistry::new(repositories),
            secrets,
            gate,
            audit,
            master_key,
        }
    }

    // ── Public operations ────────────────────────────────────────────

    /// Repositories visible to `token` upstream.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::UpstreamUnavailable`] if the listing fails.
    pub async fn list_repos(
        &self,
        ctx: &RequestContext,
        token: &str,
    ) -> Result<Vec<UpstreamRepository>, VaultError> {
        let result = self.gate.listing(token).await.map_err(VaultError::from);
        self.finish(ctx, AuditOperation::ListRepos, AuditTarget::default(), result)
            .await
    }

    /// Store `content` as the next version of `owner/repo`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AccessDenied`] or
    /// [`VaultError::UpstreamUnavailable`] when access is not proven, in
    /// which case nothing is written. Also [`VaultError::Validation`],
    /// [`VaultError::Crypto`] and [`VaultError::Persistence`].
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        token: &str,
        owner: &str,
        repo: &str,
        tag: &str,
        content: &[u8],
    ) -> Result<UploadReceipt, VaultError> {
        let mut target = AuditTarget::default();
        let result = self
            .upload_stages(ctx, token, owner, repo, tag, content, &mut target)
            .await;
        self.finish(ctx, AuditOperation::Upload, target, result).await
    }

    /// Download a version, or the latest one when `version` is 0.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the repository or version is
    /// unknown, [`VaultError::Crypto`] if the record does not decrypt, and
    /// the access errors of [`Vault::upload`].
    pub async fn download(
        &self,
        ctx: &RequestContext,
        token: &str,
        owner: &str,
        repo: &str,
        version: i32,
    ) -> Result<DownloadedSecret, VaultError> {
        let mut target = AuditTarget::default();
        let result = self
            .download_stages(token, owner, repo, version, &mut target)
            .await;
        self.finish(ctx, AuditOperation::Download, target, result)
            .await
    }

    /// Download the highest version carrying `tag`.
    ///
    /// # Errors
    ///
    /// As [`Vault::download`]; an unused tag is [`VaultError::NotFound`].
    pub async fn download_by_tag(
        &self,
        ctx: &RequestContext,
        token: &str,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<DownloadedSecret, VaultError> {
        let mut target = AuditTarget::default();
        let result = self
            .download_by_tag_stages(token, owner, repo, tag, &mut target)
            .await;
        self.finish(ctx, AuditOperation::DownloadByTag, target, result)
            .await
    }

    /// Delete one version, or every version when `version` is 0.
    ///
    /// Deleting everything from a repository with no versions succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the repository or the specific
    /// version is unknown, plus the access errors of [`Vault::upload`].
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        token: &str,
        owner: &str,
        repo: &str,
        version: i32,
    ) -> Result<DeleteOutcome, VaultError> {
        let mut target = AuditTarget::default();
        let result = self
            .delete_stages(token, owner, repo, version, &mut target)
            .await;
        self.finish(ctx, AuditOperation::Delete, target, result).await
    }

    /// Version history of `owner/repo`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the repository is unknown, plus
    /// the access errors of [`Vault::upload`].
    pub async fn list_versions(
        &self,
        ctx: &RequestContext,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<VersionSummary>, VaultError> {
        let mut target = AuditTarget::default();
        let result = self
            .list_versions_stages(token, owner, repo, &mut target)
            .await;
        self.finish(ctx, AuditOperation::ListVersions, target, result)
            .await
    }

    /// Every stored repository the caller can currently see upstream,
    /// each with its version history.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::UpstreamUnavailable`] if the listing fails and
    /// [`VaultError::Persistence`] on store failure.
    pub async fn list_all_repositories_with_versions(
        &self,
        ctx: &RequestContext,
        token: &str,
    ) -> Result<Vec<RepositoryVersions>, VaultError> {
        let result = self.list_all_stages(token).await;
        self.finish(
            ctx,
            AuditOperation::ListAllRepos,
            AuditTarget::default(),
            result,
        )
        .await
    }

    /// Audit a request that was refused before it reached one of the
    /// operations above, for example a missing token or an unreadable body.
    pub async fn record_rejection(
        &self,
        ctx: &RequestContext,
        operation: AuditOperation,
        err: &VaultError,
    ) {
        warn!(
            %operation,
            actor = %ctx.actor,
            correlation_id = %ctx.correlation_id,
            kind = err.kind(),
            error = %err,
            "request rejected"
        );
        self.audit
            .record(ctx, operation, AuditTarget::default(), Some(err))
            .await;
    }

    // ── Stages ───────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn upload_stages(
        &self,
        ctx: &RequestContext,
        token: &str,
        owner: &str,
        repo: &str,
        tag: &str,
        content: &[u8],
        target: &mut AuditTarget,
    ) -> Result<UploadReceipt, VaultError> {
        check_names(owner, repo)?;
        let upstream = self.gate.check(token, owner, repo).await.into_result()?;

        // Everything that can reject the upload runs before the first write.
        let parsed = dotenv::parse(content)?;
        let checksum = dotenv::checksum(content);
        let canonical = dotenv::serialize(&parsed);
        let (payload, wrapped_key) =
            envelope::seal(canonical.as_bytes(), &self.master_key)?.to_base64();

        let record = self.registry.get_or_create(&upstream).await?;
        target.repo_id = Some(record.id);

        let secret = self
            .secrets
            .allocate_and_insert(NewSecret {
                repo_id: record.id,
                tag: tag.to_owned(),
                payload,
                checksum,
                uploaded_by: ctx.actor.clone(),
                is_encrypted: true,
                wrapped_key: Some(wrapped_key),
            })
            .await?;
        target.secret_id = Some(secret.id);

        info!(
            owner,
            repo,
            version = secret.version,
            keys = parsed.len(),
            "secret uploaded"
        );

        Ok(UploadReceipt {
            version: secret.version,
            tag: secret.tag,
            checksum: secret.checksum,
        })
    }

    async fn download_stages(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        version: i32,
        target: &mut AuditTarget,
    ) -> Result<DownloadedSecret, VaultError> {
        check_version(version)?;
        let record = self.authorize(token, owner, repo).await?;
        *target = AuditTarget::repo(record.id);

        let secret = if version == 0 {
            self.secrets.get_latest(record.id).await?
        } else {
            self.secrets.get_by_version(record.id, version).await?
        };
        let secret = secret.ok_or_else(|| VaultError::NotFound {
            what: if version == 0 {
                format!("any version of {owner}/{repo}")
            } else {
                format!("version {version} of {owner}/{repo}")
            },
        })?;
        *target = AuditTarget::secret(record.id, secret.id);

        self.reveal(&secret)
    }

    async fn download_by_tag_stages(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        tag: &str,
        target: &mut AuditTarget,
    ) -> Result<DownloadedSecret, VaultError> {
        let record = self.authorize(token, owner, repo).await?;
        *target = AuditTarget::repo(record.id);

        let secret = self
            .secrets
            .get_by_tag(record.id, tag)
            .await?
            .ok_or_else(|| VaultError::NotFound {
                what: format!("tag '{tag}' in {owner}/{repo}"),
            })?;
        *target = AuditTarget::secret(record.id, secret.id);

        self.reveal(&secret)
    }

    async fn delete_stages(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        version: i32,
        target: &mut AuditTarget,
    ) -> Result<DeleteOutcome, VaultError> {
        check_version(version)?;
        let record = self.authorize(token, owner, repo).await?;
        *target = AuditTarget::repo(record.id);

        if version == 0 {
            let removed = self.secrets.delete_all(record.id).await?;
            info!(owner, repo, removed, "deleted all versions");
            return Ok(DeleteOutcome {
                deleted: DELETED_ALL,
            });
        }

        match self.secrets.delete_version(record.id, version).await? {
            0 => Err(VaultError::NotFound {
                what: format!("version {version} of {owner}/{repo}"),
            }),
            _ => {
                info!(owner, repo, version, "deleted version");
                Ok(DeleteOutcome { deleted: 1 })
            }
        }
    }

    async fn list_versions_stages(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        target: &mut AuditTarget,
    ) -> Result<Vec<VersionSummary>, VaultError> {
        let record = self.authorize(token, owner, repo).await?;
        *target = AuditTarget::repo(record.id);
        let versions = self.secrets.list_versions(record.id).await?;
        Ok(versions.iter().map(VersionSummary::from).collect())
    }

    /// Access is re-checked per repository against one fresh listing.
    async fn list_all_stages(&self, token: &str) -> Result<Vec<RepositoryVersions>, VaultError> {
        let listing = self.gate.listing(token).await?;
        let mut visible = Vec::new();
        for repository in self.registry.list().await? {
            if find_in_listing(&listing, &repository.owner_login, &repository.repo_name).is_none() {
                continue;
            }
            let versions = self.secrets.list_versions(repository.id).await?;
            visible.push(RepositoryVersions {
                versions: versions.iter().map(VersionSummary::from).collect(),
                repository,
            });
        }
        Ok(visible)
    }

    /// Access check followed by the registry lookup.
    async fn authorize(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<RepositoryRecord, VaultError> {
        check_names(owner, repo)?;
        self.gate.check(token, owner, repo).await.into_result()?;
        self.registry
            .find(owner, repo)
            .await?
            .ok_or_else(|| VaultError::NotFound {
                what: format!("repository {owner}/{repo}"),
            })
    }

    /// Turn a stored record back into its content.
    fn reveal(&self, record: &SecretRecord) -> Result<DownloadedSecret, VaultError> {
        let content = if record.is_encrypted {
            let wrapped_key = record.wrapped_key.as_deref().ok_or_else(|| {
                CryptoError::Encoding {
                    what: "wrapped key",
                    reason: "missing on an encrypted record".to_owned(),
                }
            })?;
            let sealed = SealedPayload::from_base64(&record.payload, wrapped_key)?;
            let plaintext = envelope::open(&sealed, &self.master_key)?;
            String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption {
                reason: format!("plaintext is not UTF-8: {e}"),
            })?
        } else {
            record.payload.clone()
        };

        Ok(DownloadedSecret {
            content,
            version: record.version,
            tag: record.tag.clone(),
            checksum: record.checksum.clone(),
            uploaded_by: record.uploaded_by.clone(),
            created_at: record.created_at,
            is_encrypted: record.is_encrypted,
        })
    }

    /// Log the outcome, write the audit entry, hand the result back.
    async fn finish<T>(
        &self,
        ctx: &RequestContext,
        operation: AuditOperation,
        target: AuditTarget,
        result: Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        match &result {
            Ok(_) => info!(
                %operation,
                actor = %ctx.actor,
                correlation_id = %ctx.correlation_id,
                "operation succeeded"
            ),
            Err(
                e @ (VaultError::Crypto(_)
                | VaultError::Persistence(_)
                | VaultError::Configuration(_)),
            ) => error!(
                %operation,
                correlation_id = %ctx.correlation_id,
                kind = e.kind(),
                error = %e,
                "operation failed"
            ),
            Err(e) => warn!(
                %operation,
                actor = %ctx.actor,
                correlation_id = %ctx.correlation_id,
                kind = e.kind(),
                error = %e,
                "operation rejected"
            ),
        }

        self.audit
            .record(ctx, operation, target, result.as_ref().err())
            .await;
        result
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("gate", &self.gate)
            .field("audit", &self.audit)
            .field("master_key", &self.master_key)
            .finish_non_exhaustive()
    }
}

fn check_names(owner: &str, repo: &str) -> Result<(), ValidationError> {
    if owner.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "owner" });
    }
    if repo.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "repo" });
    }
    Ok(())
}

fn check_version(version: i32) -> Result<(), ValidationError> {
    if version < 0 {
        return Err(ValidationError::InvalidVersion { version });
    }
    Ok(())
}
