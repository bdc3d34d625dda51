//! Caller identification middleware.
//!
//! Extracts the bearer identity token and the request metadata recorded in
//! the audit trail, and injects a [`Caller`] into the request extensions.
//! The token is forwarded to the upstream provider and never logged.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use envini_core::{AuditOperation, RequestContext, VaultError};

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the caller's correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Header naming the calling service.
pub const SERVICE_NAME_HEADER: &str = "x-service-name";
/// Header naming the acting user.
pub const ACTOR_HEADER: &str = "x-envini-actor";

/// Actor recorded when the caller does not name one.
const UNKNOWN_ACTOR: &str = "unknown";

/// Identity of the current request, injected by [`caller_middleware`].
#[derive(Clone)]
pub struct Caller {
    /// Upstream identity token from `Authorization: Bearer`.
    pub token: String,
    pub context: RequestContext,
}

impl std::fmt::Debug for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller")
            .field("token", &"[REDACTED]")
            .field("context", &self.context)
            .finish()
    }
}

fn header(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header(headers, AUTHORIZATION)?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

/// The vault operation a `/v1/repos` route maps to.
pub fn operation_for(method: &Method, route: &str) -> AuditOperation {
    if route.ends_with("/tags/{tag}") {
        AuditOperation::DownloadByTag
    } else if route.ends_with("/secrets/{version}") {
        if method == Method::DELETE {
            AuditOperation::Delete
        } else {
            AuditOperation::Download
        }
    } else if route.ends_with("/{repo}/secrets") {
        if method == Method::POST {
            AuditOperation::Upload
        } else {
            AuditOperation::ListVersions
        }
    } else if route.ends_with("/secrets") {
        AuditOperation::ListAllRepos
    } else {
        AuditOperation::ListRepos
    }
}

/// Middleware that builds the request context and requires a bearer token.
///
/// A request without a token is answered with 401 and still audited as
/// the operation its route names.
pub async fn caller_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let headers = req.headers();

    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let context = RequestContext::new(
        header(headers, ACTOR_HEADER).unwrap_or_else(|| UNKNOWN_ACTOR.to_owned()),
        header(headers, REQUEST_ID_HEADER),
    )
    .with_service_name(header(headers, SERVICE_NAME_HEADER))
    .with_user_agent(header(headers, USER_AGENT))
    .with_remote_addr(remote_addr);

    let Some(token) = bearer_token(headers) else {
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| req.uri().path().to_owned(), |p| p.as_str().to_owned());
        let operation = operation_for(req.method(), &route);
        let err = VaultError::AccessDenied {
            reason: "missing bearer token".to_owned(),
        };
        state.vault.record_rejection(&context, operation, &err).await;
        return AppError::Unauthorized("missing bearer token".to_owned()).into_response();
    };

    req.extensions_mut().insert(Caller { token, context });
    next.run(req).await
}
