//! Secret version routes: `/v1/repos/{owner}/{repo}/*`
//!
//! - `GET    .../secrets`: version history, newest first
//! - `POST   .../secrets`: upload a new version
//! - `GET    .../secrets/{version}`: download a version (`0` = latest)
//! - `DELETE .../secrets/{version}`: delete a version (`0` = all)
//! - `GET    .../tags/{tag}`: download the newest version with a tag

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use envini_core::{
    AuditOperation, DeleteOutcome, DownloadedSecret, UploadReceipt, ValidationError, VaultError,
    VersionSummary,
};

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/{owner}/{repo}/secrets",
            get(list_versions).post(upload),
        )
        .route(
            "/{owner}/{repo}/secrets/{version}",
            get(download).delete(delete_version),
        )
        .route("/{owner}/{repo}/tags/{tag}", get(download_by_tag))
}

/// Parse the `{version}` path segment. Range checks happen in the vault.
fn parse_version(raw: &str) -> Result<i32, VaultError> {
    raw.parse().map_err(|_| {
        ValidationError::Malformed {
            field: "version",
            reason: format!("expected an integer, got '{raw}'"),
        }
        .into()
    })
}

/// Audit a request the vault never saw, then turn it into a response.
async fn reject(
    state: &AppState,
    caller: &Caller,
    operation: AuditOperation,
    err: VaultError,
) -> AppError {
    state
        .vault
        .record_rejection(&caller.context, operation, &err)
        .await;
    AppError::from(err)
}

#[derive(Deserialize)]
struct UploadRequest {
    #[serde(default)]
    tag: String,
    /// `.env` file text.
    content: String,
}

#[derive(Serialize)]
struct VersionsResponse {
    versions: Vec<VersionSummary>,
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((owner, repo)): Path<(String, String)>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UploadReceipt>), AppError> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            let err = ValidationError::Malformed {
                field: "request body",
                reason: rejection.body_text(),
            };
            return Err(reject(&state, &caller, AuditOperation::Upload, err.into()).await);
        }
    };
    let receipt = state
        .vault
        .upload(
            &caller.context,
            &caller.token,
            &owner,
            &repo,
            &body.tag,
            body.content.as_bytes(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn list_versions(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<VersionsResponse>, AppError> {
    let versions = state
        .vault
        .list_versions(&caller.context, &caller.token, &owner, &repo)
        .await?;
    Ok(Json(VersionsResponse { versions }))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((owner, repo, version)): Path<(String, String, String)>,
) -> Result<Json<DownloadedSecret>, AppError> {
    let version = match parse_version(&version) {
        Ok(version) => version,
        Err(err) => return Err(reject(&state, &caller, AuditOperation::Download, err).await),
    };
    let secret = state
        .vault
        .download(&caller.context, &caller.token, &owner, &repo, version)
        .await?;
    Ok(Json(secret))
}

async fn download_by_tag(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((owner, repo, tag)): Path<(String, String, String)>,
) -> Result<Json<DownloadedSecret>, AppError> {
    let secret = state
        .vault
        .download_by_tag(&caller.context, &caller.token, &owner, &repo, &tag)
        .await?;
    Ok(Json(secret))
}

async fn delete_version(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((owner, repo, version)): Path<(String, String, String)>,
) -> Result<Json<DeleteOutcome>, AppError> {
    let version = match parse_version(&version) {
        Ok(version) => version,
        Err(err) => return Err(reject(&state, &caller, AuditOperation::Delete, err).await),
    };
    let outcome = state
        .vault
        .delete(&caller.context, &caller.token, &owner, &repo, version)
        .await?;
    Ok(Json(outcome))
}
