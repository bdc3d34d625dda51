//! Server configuration for `Envini`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The master key is the one setting without a default: the server refuses
//! to start until it is present and decodes to 32 bytes.

use std::net::SocketAddr;
use std::time::Duration;

use envini_core::access::GITHUB_API_URL;
use envini_core::audit::DEFAULT_SERVICE_NAME;
use envini_core::envelope::{LEGACY_MASTER_KEY_ENV, MASTER_KEY_ENV};
use envini_core::{ConfigError, MasterKey};

/// Default listen port.
const DEFAULT_PORT: u16 = 50053;

/// Default upstream request timeout in seconds.
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Key wrapping every data key.
    pub master_key: MasterKey,
    /// Base URL of the GitHub REST API.
    pub github_api_url: String,
    /// Timeout for each upstream listing request.
    pub provider_timeout: Duration,
    /// Path to an additional JSON-lines audit file.
    pub audit_file_path: Option<String>,
    /// Service name recorded in audit entries when the caller sends none.
    pub service_name: String,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
}

/// Supported storage backend types.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// `PostgreSQL` persistent storage.
    Postgres { url: String },
}

impl StorageBackendType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl std::fmt::Debug for StorageBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may embed a password.
        f.write_str(self.name())
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ENVINI_BIND_ADDR`: full bind address (default: `127.0.0.1:50053`)
    /// - `PORT`: port to bind on `0.0.0.0`, used when `ENVINI_BIND_ADDR` is unset
    /// - `ENVINI_STORAGE`: `memory` or `postgres` (default: `memory`)
    /// - `DATABASE_URL`: Postgres connection string; when unset it is built
    ///   from `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_SSL_MODE`
    /// - `ENVINI_MASTER_KEY` (or `MASTER_ENCRYPTION_KEY`): base64 32-byte key, required
    /// - `GITHUB_API_URL`: provider base URL (default: `https://api.github.com`)
    /// - `ENVINI_PROVIDER_TIMEOUT_SECS`: upstream timeout (default: `10`)
    /// - `ENVINI_AUDIT_FILE`: extra JSON-lines audit sink (optional)
    /// - `ENVINI_SERVICE_NAME`: default audit service name (default: `envini`)
    /// - `ENVINI_LOG_LEVEL`: log filter (default: `info`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the master key is missing or malformed, or
    /// if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // Priority: ENVINI_BIND_ADDR > PORT > default.
        let bind_addr = if let Some(addr) = var("ENVINI_BIND_ADDR") {
            addr.parse().map_err(|e| ConfigError::Invalid {
                var: "ENVINI_BIND_ADDR",
                reason: format!("{e}"),
            })?
        } else if let Some(port) = var("PORT") {
            let port: u16 = port.parse().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: format!("{e}"),
            })?;
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let storage_backend = match var("ENVINI_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            "postgres" | "postgresql" => StorageBackendType::Postgres {
                url: var("DATABASE_URL").unwrap_or_else(|| database_url_from_parts(&var)),
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "ENVINI_STORAGE",
                    reason: format!("unknown backend '{other}'"),
                });
            }
        };

        let master_key =
            MasterKey::from_sources(lookup(MASTER_KEY_ENV), var(LEGACY_MASTER_KEY_ENV))?;

        let provider_timeout = match var("ENVINI_PROVIDER_TIMEOUT_SECS") {
            Some(secs) => {
                let secs: u64 = secs.parse().map_err(|e| ConfigError::Invalid {
                    var: "ENVINI_PROVIDER_TIMEOUT_SECS",
                    reason: format!("{e}"),
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        };

        Ok(Self {
            bind_addr,
            storage_backend,
            master_key,
            github_api_url: var("GITHUB_API_URL").unwrap_or_else(|| GITHUB_API_URL.to_owned()),
            provider_timeout,
            audit_file_path: var("ENVINI_AUDIT_FILE"),
            service_name: var("ENVINI_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_owned()),
            log_level: var("ENVINI_LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
        })
    }
}

/// Build a connection URL from the discrete `DB_*` variables.
fn database_url_from_parts(var: &impl Fn(&str) -> Option<String>) -> String {
    let host = var("DB_HOST").unwrap_or_else(|| "localhost".to_owned());
    let port = var("DB_PORT").unwrap_or_else(|| "5432".to_owned());
    let user = var("DB_USER").unwrap_or_else(|| "postgres".to_owned());
    let password = var("DB_PASSWORD").unwrap_or_default();
    let name = var("DB_NAME").unwrap_or_else(|| "envini".to_owned());
    let ssl_mode = var("DB_SSL_MODE").unwrap_or_else(|| "disable".to_owned());

    let credentials = if password.is_empty() {
        urlencoding::encode(&user).into_owned()
    } else {
        format!(
            "{}:{}",
            urlencoding::encode(&user),
            urlencoding::encode(&password)
        )
    };
    format!("postgres://{credentials}@{host}:{port}/{name}?sslmode={ssl_mode}")
}
