//! `PostgreSQL` store.
//!
//! Implements all three store traits over one connection pool. Tables are
//! created on [`PostgresStore::connect`] if they do not exist.
//!
//! Version allocation uses a per-repository `last_version` counter column.
//! `UPDATE ... RETURNING` takes the row lock, so concurrent uploads to one
//! repository queue behind each other until the surrounding transaction
//! commits, and a counter value handed out is never handed out again.
//!
//! Feature-gated behind `postgres-backend`.

use sqlx::PgPool;
use sqlx::postgres::{PgConnection, PgPoolOptions};

use crate::models::{
    AuditLogEntry, NewAuditEntry, NewRepository, NewSecret, RepositoryRecord, SecretRecord,
};
use crate::{AuditStore, RepositoryStore, SecretStore, StorageError};

/// Schema statements, executed in order on connect.
const MIGRATIONS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS repositories (
        id           BIGSERIAL     PRIMARY KEY,
        owner_login  VARCHAR(255)  NOT NULL,
        repo_name    VARCHAR(255)  NOT NULL,
        upstream_id  BIGINT        NOT NULL,
        full_name    VARCHAR(500)  NOT NULL,
        html_url     VARCHAR(1000) NOT NULL,
        description  TEXT          NOT NULL DEFAULT '',
        is_private   BOOLEAN       NOT NULL DEFAULT FALSE,
        last_version INTEGER       NOT NULL DEFAULT 0,
        created_at   TIMESTAMPTZ   NOT NULL DEFAULT now(),
        updated_at   TIMESTAMPTZ   NOT NULL DEFAULT now(),
        CONSTRAINT uq_repositories_owner_name UNIQUE (owner_login, repo_name)
    )",
    r"CREATE TABLE IF NOT EXISTS secrets (
        id           BIGSERIAL    PRIMARY KEY,
        repo_id      BIGINT       NOT NULL REFERENCES repositories (id) ON DELETE CASCADE,
        version      INTEGER      NOT NULL CHECK (version > 0),
        tag          VARCHAR(255) NOT NULL DEFAULT '',
        payload      TEXT         NOT NULL,
        checksum     VARCHAR(64)  NOT NULL,
        uploaded_by  VARCHAR(255) NOT NULL,
        is_encrypted BOOLEAN      NOT NULL DEFAULT FALSE,
        wrapped_key  TEXT,
        created_at   TIMESTAMPTZ  NOT NULL DEFAULT now(),
        CONSTRAINT uq_secrets_repo_version UNIQUE (repo_id, version)
    )",
    r"CREATE INDEX IF NOT EXISTS idx_secrets_repo_tag ON secrets (repo_id, tag, version DESC)",
    r"CREATE TABLE IF NOT EXISTS audit_logs (
        id             UUID         PRIMARY KEY,
        operation      VARCHAR(50)  NOT NULL,
        repo_id        BIGINT,
        secret_id      BIGINT,
        actor          VARCHAR(255) NOT NULL,
        correlation_id VARCHAR(255) NOT NULL,
        service_name   VARCHAR(255),
        remote_addr    VARCHAR(45),
        user_agent     TEXT,
        success        BOOLEAN      NOT NULL,
        error_message  TEXT,
        created_at     TIMESTAMPTZ  NOT NULL DEFAULT now()
    )",
    r"CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs (created_at)",
];

/// A store backed by `PostgreSQL`.
///
/// Thread-safe via `PgPool`. All operations are fully async.
///
/// # Examples
///
/// ```no_run
/// # use envini_storage::PostgresStore;
/// # #[tokio::main]
/// # async fn main() {
/// let store = PostgresStore::connect("postgres://localhost/envini", 10).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresStore {
    /// Connect to `PostgreSQL` and run the schema migration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or migration fails.
    /// The connection string is never included in the error.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Open {
                target: "postgres".to_owned(),
                reason: e.to_string(),
            })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema is assumed to be in place.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if any statement fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Open {
                    target: "postgres".to_owned(),
                    reason: format!("migration failed: {e}"),
                })?;
        }
        tracing::debug!(statements = MIGRATIONS.len(), "postgres schema ready");
        Ok(())
    }

    /// Return a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn read_err(what: impl Into<String>) -> impl FnOnce(sqlx::Error) -> StorageError {
    let what = what.into();
    move |e| StorageError::Read {
        what,
        reason: e.to_string(),
    }
}

fn write_err(what: impl Into<String>) -> impl FnOnce(sqlx::Error) -> StorageError {
    let what = what.into();
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            // PostgreSQL unique violation
            if db_err.code().as_deref() == Some("23505") {
                return StorageError::Conflict { what };
            }
        }
        StorageError::Write {
            what,
            reason: e.to_string(),
        }
    }
}

fn tx_err(e: sqlx::Error) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn delete_err(what: impl Into<String>) -> impl FnOnce(sqlx::Error) -> StorageError {
    let what = what.into();
    move |e| StorageError::Delete {
        what,
        reason: e.to_string(),
    }
}

/// Insert one secret row on an open connection (usually a transaction).
async fn insert_row(
    conn: &mut PgConnection,
    secret: &NewSecret,
    version: i32,
) -> Result<SecretRecord, StorageError> {
    sqlx::query_as::<_, SecretRecord>(
        r"INSERT INTO secrets (repo_id, version, tag, payload, checksum, uploaded_by, is_encrypted, wrapped_key)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
          RETURNING *",
    )
    .bind(secret.repo_id)
    .bind(version)
    .bind(&secret.tag)
    .bind(&secret.payload)
    .bind(&secret.checksum)
    .bind(&secret.uploaded_by)
    .bind(secret.is_encrypted)
    .bind(secret.wrapped_key.as_deref())
    .fetch_one(conn)
    .await
    .map_err(write_err(format!(
        "version {version} for repository {}",
        secret.repo_id
    )))
}

// ── Repositories ─────────────────────────────────────────────────────

#[async_trait::async_trait]
impl RepositoryStore for PostgresStore {
    async fn upsert_repository(
        &self,
        repo: NewRepository,
    ) -> Result<RepositoryRecord, StorageError> {
        sqlx::query_as::<_, RepositoryRecord>(
            r"INSERT INTO repositories (owner_login, repo_name, upstream_id, full_name, html_url, description, is_private)
              VALUES ($1, $2, $3, $4, $5, $6, $7)
              ON CONFLICT (owner_login, repo_name) DO UPDATE SET
                upstream_id = EXCLUDED.upstream_id,
                full_name = EXCLUDED.full_name,
                html_url = EXCLUDED.html_url,
                description = EXCLUDED.description,
                is_private = EXCLUDED.is_private,
                updated_at = now()
              RETURNING *",
        )
        .bind(&repo.owner_login)
        .bind(&repo.repo_name)
        .bind(repo.upstream_id)
        .bind(&repo.full_name)
        .bind(&repo.html_url)
        .bind(&repo.description)
        .bind(repo.is_private)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err(format!(
            "repository {}/{}",
            repo.owner_login, repo.repo_name
        )))
    }

    async fn find_repository(
        &self,
        owner_login: &str,
        repo_name: &str,
    ) -> Result<Option<RepositoryRecord>, StorageError> {
        sqlx::query_as::<_, RepositoryRecord>(
            "SELECT * FROM repositories WHERE owner_login = $1 AND repo_name = $2",
        )
        .bind(owner_login)
        .bind(repo_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err(format!("repository {owner_login}/{repo_name}")))
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, StorageError> {
        sqlx::query_as::<_, RepositoryRecord>(
            "SELECT * FROM repositories ORDER BY owner_login, repo_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_err("repositories"))
    }
}

// ── Secrets ──────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl SecretStore for PostgresStore {
    async fn next_version(&self, repo_id: i64) -> Result<i32, StorageError> {
        let mark: Option<i32> =
            sqlx::query_scalar("SELECT last_version FROM repositories WHERE id = $1")
                .bind(repo_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(read_err(format!("version counter for repository {repo_id}")))?;

        Ok(mark.unwrap_or(0).saturating_add(1))
    }

    async fn insert_secret(
        &self,
        secret: NewSecret,
        version: i32,
    ) -> Result<SecretRecord, StorageError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        let record = insert_row(&mut tx, &secret, version).await?;

        sqlx::query(
            "UPDATE repositories SET last_version = GREATEST(last_version, $2) WHERE id = $1",
        )
        .bind(secret.repo_id)
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(write_err(format!(
            "version counter for repository {}",
            secret.repo_id
        )))?;

        tx.commit().await.map_err(tx_err)?;
        Ok(record)
    }

    async fn allocate_and_insert(&self, secret: NewSecret) -> Result<SecretRecord, StorageError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        let version: i32 = sqlx::query_scalar(
            "UPDATE repositories SET last_version = last_version + 1 WHERE id = $1 RETURNING last_version",
        )
        .bind(secret.repo_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(write_err(format!(
            "version counter for repository {}",
            secret.repo_id
        )))?
        .ok_or_else(|| StorageError::Write {
            what: format!("secret for repository {}", secret.repo_id),
            reason: "repository does not exist".to_owned(),
        })?;

        // Dropping `tx` on error rolls the counter increment back.
        let record = insert_row(&mut tx, &secret, version).await?;

        tx.commit().await.map_err(tx_err)?;
        Ok(record)
    }

    async fn get_by_version(
        &self,
        repo_id: i64,
        version: i32,
    ) -> Result<Option<SecretRecord>, StorageError> {
        sqlx::query_as::<_, SecretRecord>(
            "SELECT * FROM secrets WHERE repo_id = $1 AND version = $2",
        )
        .bind(repo_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err(format!("version {version} of repository {repo_id}")))
    }

    async fn get_by_tag(
        &self,
        repo_id: i64,
        tag: &str,
    ) -> Result<Option<SecretRecord>, StorageError> {
        sqlx::query_as::<_, SecretRecord>(
            r"SELECT * FROM secrets
              WHERE repo_id = $1 AND tag = $2
              ORDER BY version DESC
              LIMIT 1",
        )
        .bind(repo_id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err(format!("tag '{tag}' of repository {repo_id}")))
    }

    async fn get_latest(&self, repo_id: i64) -> Result<Option<SecretRecord>, StorageError> {
        sqlx::query_as::<_, SecretRecord>(
            "SELECT * FROM secrets WHERE repo_id = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err(format!("latest version of repository {repo_id}")))
    }

    async fn list_versions(&self, repo_id: i64) -> Result<Vec<SecretRecord>, StorageError> {
        sqlx::query_as::<_, SecretRecord>(
            "SELECT * FROM secrets WHERE repo_id = $1 ORDER BY version DESC",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err(format!("versions of repository {repo_id}")))
    }

    async fn delete_version(&self, repo_id: i64, version: i32) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM secrets WHERE repo_id = $1 AND version = $2")
            .bind(repo_id)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(delete_err(format!(
                "version {version} of repository {repo_id}"
            )))?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self, repo_id: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM secrets WHERE repo_id = $1")
            .bind(repo_id)
            .execute(&self.pool)
            .await
            .map_err(delete_err(format!("versions of repository {repo_id}")))?;

        Ok(result.rows_affected())
    }
}

// ── Audit ────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl AuditStore for PostgresStore {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "postgres"
    }

    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, StorageError> {
        let entry = entry.into_entry();
        sqlx::query(
            r"INSERT INTO audit_logs (id, operation, repo_id, secret_id, actor, correlation_id, service_name, remote_addr, user_agent, success, error_message, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(entry.id)
        .bind(&entry.operation)
        .bind(entry.repo_id)
        .bind(entry.secret_id)
        .bind(&entry.actor)
        .bind(&entry.correlation_id)
        .bind(entry.service_name.as_deref())
        .bind(entry.remote_addr.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.success)
        .bind(entry.error_message.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err(format!("audit entry {}", entry.id)))?;

        Ok(entry)
    }
}
