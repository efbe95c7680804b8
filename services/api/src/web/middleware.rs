//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes, and the panic handler
//! installed at the edge of the router.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kuberstack_core::ports::PortError;
use std::any::Any;
use std::sync::Arc;
use tracing::error;

use crate::auth::Authentication;
use crate::error::ApiError;
use crate::web::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolves the `X-Api-Key` header to a `Principal` and inserts it into the
/// request extensions. Missing, unknown and expired tokens are all 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    match state.auth.authenticate(&token).await? {
        Authentication::Principal(principal) => {
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        }
        Authentication::Anonymous | Authentication::Invalid => {
            Err(ApiError::Port(PortError::InvalidToken))
        }
    }
}

/// Turns a panic in any handler into a generic 500. The payload is logged,
/// never returned.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(panic = detail, "Request handler panicked");
    ApiError::Internal("request handler panicked".to_string()).into_response()
}
