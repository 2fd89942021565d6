//! Login and token verification.
//!
//! POST /auth/login: passwordless email login, user created on first sight.
//! POST /auth/verify: token introspection for clients and the UI.

use axum::{Json, extract::State, http::StatusCode, http::header::HeaderMap};
use std::sync::Arc;

use crate::auth::service::AuthError;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiError, LoginRequest, LoginResponse, VerifyRequest, VerifyResponse};

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let requested_admin = req.user_type.as_deref() == Some("admin");

    match state.auth.login(&req.email, requested_admin).await {
        Ok(outcome) => Ok(Json(LoginResponse {
            token: outcome.token,
            user_type: outcome.user.role.as_str().to_string(),
            email: outcome.user.email,
            user_id: outcome.user.user_id,
        })),
        Err(AuthError::InvalidEmail) => Err(ApiError::bad_request("Invalid email")),
        Err(AuthError::AdminMismatch) => Err(ApiError::forbidden("Admin access is restricted")),
        Err(e) => {
            tracing::error!(error = %e, "login failed");
            Err(ApiError::internal("Login failed"))
        }
    }
}

/// Accepts the token either as a Bearer header or in the JSON body.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<VerifyRequest>>,
) -> Result<(StatusCode, Json<VerifyResponse>), ApiError> {
    let header_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);
    let body_token = body.and_then(|Json(req)| req.token);

    let token = header_token
        .or(body_token)
        .ok_or_else(|| ApiError::unauthorized("Missing token"))?;

    let claims = state
        .auth
        .verify_token(&token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token subject"))?;

    Ok((
        StatusCode::OK,
        Json(VerifyResponse {
            valid: true,
            user_id,
            user_type: claims.role,
            email: claims.email,
        }),
    ))
}
