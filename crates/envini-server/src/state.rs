//! Shared application state for the `Envini` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use envini_core::Vault;

/// Shared application state passed to all HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub vault: Vault,
    /// Name of the configured storage backend, reported by the health check.
    pub storage_backend: &'static str,
}
