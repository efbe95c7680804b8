//! services/api/src/web/install.rs
//!
//! Handlers for starting, polling and tearing down the installation.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::adapters::provisioner::KUBECONFIG_FILE;
use crate::auth::Principal;
use crate::error::{ApiError, ErrorBody};
use crate::web::protocol::{Ack, ClusterConfResponse, InstallStatusResponse};
use crate::web::state::AppState;

/// POST /install - Launch the provisioning tool
#[utoipa::path(
    post,
    path = "/install",
    tag = "install",
    security(("api_key" = [])),
    responses(
        (status = 202, description = "Installation started", body = InstallStatusResponse),
        (status = 409, description = "Already running or installed", body = ErrorBody),
        (status = 412, description = "Wizard incomplete", body = ErrorBody),
        (status = 502, description = "The tool could not be launched", body = ErrorBody)
    )
)]
pub async fn start_install_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.installer.start(&principal).await?;
    Ok((StatusCode::ACCEPTED, Json(InstallStatusResponse::from(status))))
}

/// GET /install/status - Progress of the current installation
#[utoipa::path(
    get,
    path = "/install/status",
    tag = "install",
    security(("api_key" = [])),
    responses((status = 200, description = "Progress snapshot", body = InstallStatusResponse))
)]
pub async fn install_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<InstallStatusResponse>, ApiError> {
    Ok(Json(state.installer.status(&principal)?.into()))
}

/// GET /install/config - The cluster configuration that will be installed
#[utoipa::path(
    get,
    path = "/install/config",
    tag = "install",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Cluster configuration", body = ClusterConfResponse),
        (status = 412, description = "Wizard incomplete", body = ErrorBody)
    )
)]
pub async fn cluster_conf_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ClusterConfResponse>, ApiError> {
    Ok(Json(state.wizard.cluster_conf(&principal)?.into()))
}

/// GET /install/kubeconfig - Download the cluster's kubeconfig
#[utoipa::path(
    get,
    path = "/install/kubeconfig",
    tag = "install",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "The kubeconfig file", body = String, content_type = "text/plain"),
        (status = 404, description = "No successful installation yet", body = ErrorBody)
    )
)]
pub async fn kubeconfig_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let contents = state.installer.kubeconfig(&principal).await?;
    let disposition = format!("attachment; filename=\"{}\"", KUBECONFIG_FILE);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        contents,
    ))
}

/// POST /install/vanish - Tear the cluster down and close the session
#[utoipa::path(
    post,
    path = "/install/vanish",
    tag = "install",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Cluster removed; the token is no longer valid", body = Ack),
        (status = 409, description = "Nothing finished to tear down", body = ErrorBody),
        (status = 502, description = "Teardown failed; retry", body = ErrorBody)
    )
)]
pub async fn vanish_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Ack>, ApiError> {
    state.installer.vanish(&principal).await?;
    Ok(Json(Ack::ok()))
}
