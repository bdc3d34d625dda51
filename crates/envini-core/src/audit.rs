//! Audit trail for vault operations.
//!
//! Every public [`crate::Vault`] call produces exactly one entry, on success
//! and on every failure branch, before it returns. Entries fan out to every
//! configured [`AuditStore`]. A backend failure is reported through
//! `tracing` and never changes the result of the operation being audited.

use std::fmt;
use std::sync::Arc;

use envini_storage::{AuditStore, NewAuditEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::VaultError;

/// Service name recorded when the caller does not identify itself.
pub const DEFAULT_SERVICE_NAME: &str = "envini";

/// The operation an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    ListRepos,
    Upload,
    Download,
    DownloadByTag,
    Delete,
    ListVersions,
    ListAllRepos,
}

impl AuditOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListRepos => "LIST_REPOS",
            Self::Upload => "UPLOAD",
            Self::Download => "DOWNLOAD",
            Self::DownloadByTag => "DOWNLOAD_BY_TAG",
            Self::Delete => "DELETE",
            Self::ListVersions => "LIST_VERSIONS",
            Self::ListAllRepos => "LIST_ALL_REPOS",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling, and on behalf of which request.
///
/// Built once per inbound request and passed to every vault operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Login of the acting user.
    pub actor: String,
    /// Caller-supplied request id, or a generated UUID v4.
    pub correlation_id: String,
    pub service_name: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Create a context, generating a correlation id when none (or a blank
    /// one) is supplied.
    #[must_use]
    pub fn new(actor: impl Into<String>, correlation_id: Option<String>) -> Self {
        let correlation_id = correlation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            actor: actor.into(),
            correlation_id,
            service_name: None,
            remote_addr: None,
            user_agent: None,
        }
    }

    #[must_use]
    pub fn with_service_name(mut self, name: Option<String>) -> Self {
        self.service_name = name.filter(|n| !n.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: Option<String>) -> Self {
        self.remote_addr = addr;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, agent: Option<String>) -> Self {
        self.user_agent = agent;
        self
    }
}

/// Store ids an audit entry refers to, when known at the exit point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditTarget {
    pub repo_id: Option<i64>,
    pub secret_id: Option<i64>,
}

impl AuditTarget {
    #[must_use]
    pub fn repo(repo_id: i64) -> Self {
        Self {
            repo_id: Some(repo_id),
            secret_id: None,
        }
    }

    #[must_use]
    pub fn secret(repo_id: i64, secret_id: i64) -> Self {
        Self {
            repo_id: Some(repo_id),
            secret_id: Some(secret_id),
        }
    }
}

/// Fans audit entries out to one or more backends.
#[derive(Clone)]
pub struct AuditLogger {
    backends: Vec<Arc<dyn AuditStore>>,
    default_service_name: String,
}

impl AuditLogger {
    /// Create a logger with no backends.
    #[must_use]
    pub fn new(default_service_name: impl Into<String>) -> Self {
        Self {
            backends: Vec::new(),
            default_service_name: default_service_name.into(),
        }
    }

    /// Register an additional backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn AuditStore>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Number of configured backends.
    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Write one entry to every backend.
    ///
    /// Failures are logged at `error` level and otherwise swallowed.
    pub async fn record(
        &self,
        ctx: &RequestContext,
        operation: AuditOperation,
        target: AuditTarget,
        outcome: Option<&VaultError>,
    ) {
        let entry = NewAuditEntry {
            operation: operation.as_str().to_owned(),
            repo_id: target.repo_id,
            secret_id: target.secret_id,
            actor: ctx.actor.clone(),
            correlation_id: ctx.correlation_id.clone(),
            service_name: Some(
                ctx.service_name
                    .clone()
                    .unwrap_or_else(|| self.default_service_name.clone()),
            ),
            remote_addr: ctx.remote_addr.clone(),
            user_agent: ctx.user_agent.clone(),
            success: outcome.is_none(),
            error_message: outcome.map(VaultError::audit_message),
        };

        if self.backends.is_empty() {
            debug!(%operation, "no audit backends configured");
            return;
        }

        let mut any_success = false;
        for backend in &self.backends {
            match backend.append(entry.clone()).await {
                Ok(_) => any_success = true,
                Err(e) => {
                    error!(
                        backend = backend.name(),
                        %operation,
                        correlation_id = %ctx.correlation_id,
                        error = %e,
                        "audit backend failed"
                    );
                }
            }
        }

        if !any_success {
            error!(
                %operation,
                correlation_id = %ctx.correlation_id,
                backends = self.backends.len(),
                "all audit backends failed"
            );
        }
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("AuditLogger")
            .field("backends", &names)
            .field("default_service_name", &self.default_service_name)
            .finish()
    }
}
