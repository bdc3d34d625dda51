//! Access gate backed by a live upstream repository listing.
//!
//! No decision is cached: every call asks the provider which repositories
//! the identity token can see right now and looks for an exact,
//! case-sensitive `(owner, name)` match. The gate is fail-closed. A
//! transport error, a non-success status or an undecodable body is
//! [`AccessDecision::UpstreamUnavailable`], which grants nothing.
//!
//! Only the first page (100 repositories) of the listing is consulted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, VaultError};

/// Default GitHub REST API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Repositories requested per listing call.
const PAGE_SIZE: u32 = 100;

/// A repository as reported by the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRepository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub description: String,
    pub is_private: bool,
    pub owner_login: String,
    pub owner_avatar_url: String,
}

/// Source of truth for which repositories an identity token can access.
#[async_trait::async_trait]
pub trait RepositoryProvider: Send + Sync + 'static {
    /// The provider's name (for logging).
    fn name(&self) -> &str;

    /// List the repositories visible to `token`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the listing cannot be obtained.
    async fn list_repositories(&self, token: &str)
    -> Result<Vec<UpstreamRepository>, ProviderError>;
}

// ── GitHub ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GitHubRepo {
    id: i64,
    name: String,
    full_name: String,
    html_url: String,
    description: Option<String>,
    private: bool,
    owner: GitHubOwner,
}

#[derive(Deserialize)]
struct GitHubOwner {
    login: String,
    #[serde(default)]
    avatar_url: String,
}

impl From<GitHubRepo> for UpstreamRepository {
    fn from(repo: GitHubRepo) -> Self {
        Self {
            id: repo.id,
            name: repo.name,
            full_name: repo.full_name,
            html_url: repo.html_url,
            description: repo.description.unwrap_or_default(),
            is_private: repo.private,
            owner_login: repo.owner.login,
            owner_avatar_url: repo.owner.avatar_url,
        }
    }
}

/// Lists repositories through the GitHub REST API (`GET /user/repos`).
#[derive(Clone)]
pub struct GitHubProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubProvider {
    /// Build a provider for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        let client = reqwest::Client::builder()
            .user_agent(concat!("envini/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl fmt::Debug for GitHubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl RepositoryProvider for GitHubProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "github"
    }

    async fn list_repositories(
        &self,
        token: &str,
    ) -> Result<Vec<UpstreamRepository>, ProviderError> {
        let url = format!("{}/user/repos?per_page={PAGE_SIZE}", self.base_url);
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }

        let repos: Vec<GitHubRepo> = response.json().await.map_err(|e| ProviderError::Decode {
            reason: e.without_url().to_string(),
        })?;

        Ok(repos.into_iter().map(UpstreamRepository::from).collect())
    }
}

// ── Gate ─────────────────────────────────────────────────────────────

/// Outcome of an access check. Only [`AccessDecision::Allowed`] grants access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The repository is in the caller's live listing.
    Allowed(UpstreamRepository),
    /// The listing was obtained and does not contain the repository.
    Denied { reason: String },
    /// The listing could not be obtained.
    UpstreamUnavailable { reason: String },
}

impl AccessDecision {
    /// Convert into the vault's result type.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AccessDenied`] or
    /// [`VaultError::UpstreamUnavailable`] for anything but `Allowed`.
    pub fn into_result(self) -> Result<UpstreamRepository, VaultError> {
        match self {
            Self::Allowed(repo) => Ok(repo),
            Self::Denied { reason } => Err(VaultError::AccessDenied { reason }),
            Self::UpstreamUnavailable { reason } => Err(VaultError::UpstreamUnavailable { reason }),
        }
    }
}

/// Find `(owner, name)` in a listing. Exact, case-sensitive.
#[must_use]
pub fn find_in_listing<'a>(
    listing: &'a [UpstreamRepository],
    owner: &str,
    name: &str,
) -> Option<&'a UpstreamRepository> {
    listing
        .iter()
        .find(|repo| repo.owner_login == owner && repo.name == name)
}

/// Re-validates repository access against the provider on every call.
#[derive(Clone)]
pub struct AccessGate {
    provider: Arc<dyn RepositoryProvider>,
}

impl AccessGate {
    #[must_use]
    pub fn new(provider: Arc<dyn RepositoryProvider>) -> Self {
        Self { provider }
    }

    /// Fetch the caller's full listing.
    ///
    /// A blank token is reported as a 401 without contacting the provider.
    /// Dropping the returned future aborts the in-flight request.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`ProviderError`].
    pub async fn listing(&self, token: &str) -> Result<Vec<UpstreamRepository>, ProviderError> {
        if token.trim().is_empty() {
            return Err(ProviderError::Status { status: 401 });
        }
        self.provider.list_repositories(token).await.inspect_err(|e| {
            warn!(provider = self.provider.name(), error = %e, "repository listing failed");
        })
    }

    /// Decide whether `token` can currently access `owner/name`.
    pub async fn check(&self, token: &str, owner: &str, name: &str) -> AccessDecision {
        if token.trim().is_empty() {
            return AccessDecision::Denied {
                reason: "missing identity token".to_owned(),
            };
        }

        let listing = match self.listing(token).await {
            Ok(listing) => listing,
            Err(e) => {
                return AccessDecision::UpstreamUnavailable {
                    reason: e.to_string(),
                };
            }
        };

        if let Some(repo) = find_in_listing(&listing, owner, name) {
            debug!(owner, repo = name, "access granted");
            AccessDecision::Allowed(repo.clone())
        } else {
            debug!(owner, repo = name, visible = listing.len(), "access denied");
            AccessDecision::Denied {
                reason: format!("no access to repository {owner}/{name}"),
            }
        }
    }
}

impl fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGate")
            .field("provider", &self.provider.name())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn repo(owner: &str, name: &str) -> UpstreamRepository {
        UpstreamRepository {
            id: 42,
            name: name.to_owned(),
            full_name: format!("{owner}/{name}"),
            html_url: format!("https://github.com/{owner}/{name}"),
            description: String::new(),
            is_private: true,
            owner_login: owner.to_owned(),
            owner_avatar_url: String::new(),
        }
    }

    /// Returns a scripted listing and counts calls.
    struct Scripted {
        result: Mutex<Result<Vec<UpstreamRepository>, u16>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn ok(repos: Vec<UpstreamRepository>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Ok(repos)),
                calls: Mutex::new(0),
            })
        }

        fn status(status: u16) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Err(status)),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl RepositoryProvider for Scripted {
        #[allow(clippy::unnecessary_literal_bound)]
        fn name(&self) -> &str {
            "scripted"
        }

        async fn list_repositories(
            &self,
            _token: &str,
        ) -> Result<Vec<UpstreamRepository>, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.result
                .lock()
                .unwrap()
                .clone()
                .map_err(|status| ProviderError::Status { status })
        }
    }

    #[tokio::test]
    async fn allowed_returns_upstream_metadata() {
        let gate = AccessGate::new(Scripted::ok(vec![repo("acme", "widgets")]));
        let found = gate
            .check("tok", "acme", "widgets")
            .await
            .into_result()
            .unwrap();
        assert_eq!(found.full_name, "acme/widgets");
    }

    #[tokio::test]
    async fn match_is_exact_and_case_sensitive() {
        let gate = AccessGate::new(Scripted::ok(vec![repo("acme", "widgets")]));
        for (owner, name) in [("Acme", "widgets"), ("acme", "Widgets"), ("acme", "widget")] {
            let decision = gate.check("tok", owner, name).await;
            assert!(matches!(decision, AccessDecision::Denied { .. }), "{owner}/{name}");
        }
    }

    #[tokio::test]
    async fn provider_failure_is_upstream_unavailable_not_allowed() {
        let gate = AccessGate::new(Scripted::status(502));
        let decision = gate.check("tok", "acme", "widgets").await;
        assert!(matches!(decision, AccessDecision::UpstreamUnavailable { .. }));
        assert!(matches!(
            decision.into_result(),
            Err(VaultError::UpstreamUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn every_check_hits_the_provider() {
        let provider = Scripted::ok(vec![repo("acme", "widgets")]);
        let gate = AccessGate::new(provider.clone());
        gate.check("tok", "acme", "widgets").await;
        gate.check("tok", "acme", "widgets").await;
        assert_eq!(*provider.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn blank_token_is_denied_without_a_call() {
        let provider = Scripted::ok(vec![repo("acme", "widgets")]);
        let gate = AccessGate::new(provider.clone());
        let decision = gate.check("  ", "acme", "widgets").await;
        assert!(matches!(decision, AccessDecision::Denied { .. }));
        assert_eq!(*provider.calls.lock().unwrap(), 0);
    }

    #[test]
    fn github_payload_decodes_null_description() {
        let body = r#"[{"id":1,"name":"widgets","full_name":"acme/widgets",
            "html_url":"https://github.com/acme/widgets","description":null,
            "private":false,"owner":{"login":"acme","avatar_url":"https://a/1"}}]"#;
        let repos: Vec<GitHubRepo> = serde_json::from_str(body).unwrap();
        let repo = UpstreamRepository::from(repos.into_iter().next().unwrap());
        assert_eq!(repo.description, "");
        assert_eq!(repo.owner_login, "acme");
        assert!(!repo.is_private);
    }
}
