//! HTTP handlers for the config, role, session and lease paths.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::backend::{RevocationOutcome, WriteMode};
use crate::domain::{ConfigUpdate, ConfigView, IssuedSecret, RoleUpdate, RoleView};

use super::error::ApiError;
use super::routes::ApiState;

/// An issued secret with the lease duration the caller should honour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretResponse {
    #[serde(flatten)]
    pub secret: IssuedSecret,
    /// Effective lease TTL in seconds
    pub lease_duration: u64,
    pub renewable: bool,
}

impl SecretResponse {
    fn new(state: &ApiState, secret: IssuedSecret) -> Self {
        let defaults = state.backend.lease_defaults();
        let lease_duration = defaults.effective_ttl(&secret.lease).as_secs();
        let renewable = secret.lease.renewable;
        Self { secret, lease_duration, renewable }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleListResponse {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[instrument(skip(state))]
pub async fn read_config_handler(
    State(state): State<ApiState>,
) -> Result<Json<ConfigView>, ApiError> {
    Ok(Json(state.backend.read_config().await?))
}

#[instrument(skip(state, update))]
pub async fn create_config_handler(
    State(state): State<ApiState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigView>, ApiError> {
    Ok(Json(state.backend.write_config(update, WriteMode::Create).await?))
}

#[instrument(skip(state, update))]
pub async fn update_config_handler(
    State(state): State<ApiState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigView>, ApiError> {
    Ok(Json(state.backend.write_config(update, WriteMode::Update).await?))
}

#[instrument(skip(state))]
pub async fn delete_config_handler(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    state.backend.delete_config().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_roles_handler(
    State(state): State<ApiState>,
) -> Result<Json<RoleListResponse>, ApiError> {
    let keys = state.backend.list_roles().await?;
    Ok(Json(RoleListResponse { keys }))
}

#[instrument(skip(state), fields(role = %name))]
pub async fn read_role_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<RoleView>, ApiError> {
    match state.backend.read_role(&name).await? {
        Some(view) => Ok(Json(view)),
        None => Err(ApiError::not_found(format!("role '{}' does not exist", name))),
    }
}

#[instrument(skip(state, update), fields(role = %name))]
pub async fn create_role_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<RoleView>, ApiError> {
    Ok(Json(state.backend.write_role(&name, update, WriteMode::Create).await?))
}

#[instrument(skip(state, update), fields(role = %name))]
pub async fn update_role_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<RoleView>, ApiError> {
    Ok(Json(state.backend.write_role(&name, update, WriteMode::Update).await?))
}

#[instrument(skip(state), fields(role = %name))]
pub async fn delete_role_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.backend.delete_role(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state), fields(role = %role))]
pub async fn issue_session_handler(
    State(state): State<ApiState>,
    Path(role): Path<String>,
) -> Result<Json<SecretResponse>, ApiError> {
    let secret = state.backend.issue(&role).await?;
    Ok(Json(SecretResponse::new(&state, secret)))
}

/// 200 with the restamped secret, 204 once the role is gone.
#[instrument(skip(state, secret), fields(lease_id = %secret.lease_id))]
pub async fn renew_lease_handler(
    State(state): State<ApiState>,
    Json(secret): Json<IssuedSecret>,
) -> Result<Response, ApiError> {
    match state.backend.renew(&secret).await? {
        Some(renewed) => Ok(Json(SecretResponse::new(&state, renewed)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[instrument(skip(state, secret), fields(lease_id = %secret.lease_id))]
pub async fn revoke_lease_handler(
    State(state): State<ApiState>,
    Json(secret): Json<IssuedSecret>,
) -> Result<Json<RevocationOutcome>, ApiError> {
    Ok(Json(state.backend.revoke(&secret).await?))
}
