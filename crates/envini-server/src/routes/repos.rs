//! Repository listing routes: `/v1/repos`
//!
//! - `GET /v1/repos`: repositories the caller can see upstream
//! - `GET /v1/repos/secrets`: stored repositories the caller can see, with
//!   their version history

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use envini_core::{RepositoryVersions, UpstreamRepository};

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_repos))
        .route("/secrets", get(list_all))
}

#[derive(Serialize)]
struct ListResponse<T> {
    repositories: Vec<T>,
}

async fn list_repos(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ListResponse<UpstreamRepository>>, AppError> {
    let repositories = state
        .vault
        .list_repos(&caller.context, &caller.token)
        .await?;
    Ok(Json(ListResponse { repositories }))
}

async fn list_all(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ListResponse<RepositoryVersions>>, AppError> {
    let repositories = state
        .vault
        .list_all_repositories_with_versions(&caller.context, &caller.token)
        .await?;
    Ok(Json(ListResponse { repositories }))
}
