//! `Envini` server entry point.
//!
//! Bootstraps the storage backend, audit sinks and upstream provider, then
//! starts the Axum HTTP server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use envini_core::{AccessGate, AuditLogger, GitHubProvider, Vault};
use envini_storage::{AuditStore, FileAuditStore, MemoryStore, RepositoryStore, SecretStore};

use envini_server::config::{ServerConfig, StorageBackendType};
use envini_server::routes;
use envini_server::state::AppState;

/// Connections kept by the Postgres pool.
#[cfg(feature = "postgres-backend")]
const POSTGRES_MAX_CONNECTIONS: u32 = 10;

type Stores = (
    Arc<dyn RepositoryStore>,
    Arc<dyn SecretStore>,
    Arc<dyn AuditStore>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "Envini starting");

    let state = build_app_state(&config).await?;
    let app = routes::build_router(Arc::new(state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Envini server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("Envini server stopped");
    Ok(())
}

/// Open the configured backend. One store serves all three roles.
async fn open_stores(backend: &StorageBackendType) -> anyhow::Result<Stores> {
    match backend {
        StorageBackendType::Memory => {
            warn!("using in-memory storage, data is lost on restart");
            let store = MemoryStore::new();
            Ok((
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store),
            ))
        }
        #[cfg(feature = "postgres-backend")]
        StorageBackendType::Postgres { url } => {
            let store = envini_storage::PostgresStore::connect(url, POSTGRES_MAX_CONNECTIONS)
                .await
                .context("failed to open postgres storage")?;
            info!("postgres storage ready");
            Ok((
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store),
            ))
        }
        #[cfg(not(feature = "postgres-backend"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!("postgres storage requested but the postgres-backend feature is disabled")
        }
    }
}

async fn build_app_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let (repositories, secrets, primary_audit) = open_stores(&config.storage_backend).await?;

    let mut audit = AuditLogger::new(config.service_name.clone()).with_backend(primary_audit);
    if let Some(path) = &config.audit_file_path {
        audit = audit.with_backend(Arc::new(FileAuditStore::new(path)));
        info!(path = %path, "file audit sink enabled");
    }

    let provider = GitHubProvider::new(config.github_api_url.clone(), config.provider_timeout)
        .context("failed to build GitHub client")?;
    info!(base_url = provider.base_url(), "upstream provider configured");

    let vault = Vault::new(
        repositories,
        secrets,
        AccessGate::new(Arc::new(provider)),
        audit,
        config.master_key.clone(),
    );

    Ok(AppState {
        vault,
        storage_backend: config.storage_backend.name(),
    })
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
