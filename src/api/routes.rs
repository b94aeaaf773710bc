use std::sync::Arc;

use axum::{
    extract::Request,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::backend::Backend;
use crate::request_span;

use super::handlers::{
    create_config_handler, create_role_handler, delete_config_handler, delete_role_handler,
    health_handler, issue_session_handler, list_roles_handler, read_config_handler,
    read_role_handler, renew_lease_handler, revoke_lease_handler, update_config_handler,
    update_role_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<Backend>,
}

pub fn build_router(backend: Arc<Backend>) -> Router {
    let api_state = ApiState { backend };

    Router::new()
        .route(
            "/v1/config",
            get(read_config_handler)
                .post(create_config_handler)
                .put(update_config_handler)
                .delete(delete_config_handler),
        )
        .route("/v1/roles", get(list_roles_handler))
        .route(
            "/v1/roles/{name}",
            get(read_role_handler)
                .post(create_role_handler)
                .put(update_role_handler)
                .delete(delete_role_handler),
        )
        .route("/v1/session/{role}", get(issue_session_handler))
        .route("/v1/leases/renew", post(renew_lease_handler))
        .route("/v1/leases/revoke", post(revoke_lease_handler))
        .route("/v1/health", get(health_handler))
        .with_state(api_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| request_span!(request.method(), request.uri().path())),
        )
}
