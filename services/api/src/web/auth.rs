//! services/api/src/web/auth.rs
//!
//! The one public endpoint: issuing a session token.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::error::{ApiError, ErrorBody};
use crate::web::protocol::TokenResponse;
use crate::web::state::AppState;

/// GET /session-id - Start a new wizard session
#[utoipa::path(
    get,
    path = "/session-id",
    tag = "session",
    responses(
        (status = 200, description = "A new session token", body = TokenResponse),
        (status = 503, description = "Session storage unavailable", body = ErrorBody)
    )
)]
pub async fn session_id_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.auth.issue_token().await?;
    Ok(Json(TokenResponse {
        status: true,
        token,
    }))
}
