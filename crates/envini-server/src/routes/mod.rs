//! HTTP route modules and the top-level router.

pub mod repos;
pub mod secrets;
pub mod sys;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware as axum_mw;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{ACTOR_HEADER, REQUEST_ID_HEADER, SERVICE_NAME_HEADER, caller_middleware};
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Everything under /v1/repos needs a bearer token.
    let vault_routes = Router::new()
        .nest("/v1/repos", repos::router().merge(secrets::router()))
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            caller_middleware,
        ));

    let sys_routes = Router::new()
        .nest("/v1/sys", sys::router())
        .layer(tower::limit::ConcurrencyLimitLayer::new(10));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(SERVICE_NAME_HEADER),
            HeaderName::from_static(ACTOR_HEADER),
        ]);

    Router::new()
        .merge(sys_routes)
        .merge(vault_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
