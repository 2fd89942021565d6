use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::gateway::{state::AppState, types::ApiError};
use crate::models::Role;

/// The authenticated caller, injected as a request extension after token
/// verification.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid token format"))?;

    let claims = state
        .auth
        .verify_token(token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token subject"))?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email.clone(),
        role: claims.role(),
    });
    Ok(next.run(request).await)
}

/// Role gate for the admin surface. Must be layered after
/// [`jwt_auth_middleware`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    if !user.role.is_admin() {
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}
