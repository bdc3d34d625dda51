//! Shared fixtures for vault integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use envini_core::access::AccessGate;
use envini_core::{
    AuditLogger, MasterKey, ProviderError, RepositoryProvider, RequestContext, UpstreamRepository,
    Vault,
};
use envini_storage::MemoryStore;

pub const TOKEN: &str = "gho_test_token";

/// In-process provider that serves a listing per token.
#[derive(Default)]
pub struct FakeGitHub {
    grants: Mutex<Vec<(String, UpstreamRepository)>>,
}

impl FakeGitHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn grant(&self, token: &str, owner: &str, name: &str) {
        let id = i64::try_from(self.grants.lock().unwrap().len()).unwrap() + 1;
        self.grants.lock().unwrap().push((
            token.to_owned(),
            UpstreamRepository {
                id,
                name: name.to_owned(),
                full_name: format!("{owner}/{name}"),
                html_url: format!("https://github.com/{owner}/{name}"),
                description: format!("{name} repository"),
                is_private: true,
                owner_login: owner.to_owned(),
                owner_avatar_url: format!("https://avatars.example/{owner}"),
            },
        ));
    }

    pub fn revoke_all(&self, token: &str) {
        self.grants.lock().unwrap().retain(|(t, _)| t != token);
    }
}

#[async_trait::async_trait]
impl RepositoryProvider for FakeGitHub {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "fake-github"
    }

    async fn list_repositories(
        &self,
        token: &str,
    ) -> Result<Vec<UpstreamRepository>, ProviderError> {
        Ok(self
            .grants
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, repo)| repo.clone())
            .collect())
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub github: Arc<FakeGitHub>,
    pub master_key: MasterKey,
    pub vault: Vault,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_key(MemoryStore::new(), FakeGitHub::new(), MasterKey::generate())
    }

    pub fn with_key(store: MemoryStore, github: Arc<FakeGitHub>, master_key: MasterKey) -> Self {
        let vault = Vault::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            AccessGate::new(github.clone()),
            AuditLogger::new("envini").with_backend(Arc::new(store.clone())),
            master_key.clone(),
        );
        Self {
            store,
            github,
            master_key,
            vault,
        }
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new("octocat", None).with_service_name(Some("cli".to_owned()))
}
