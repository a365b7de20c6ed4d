//! HTTP handlers for the auth API

use std::sync::Arc;

use auth_core::{AuthenticatedPrincipal, AuthenticationResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::models::*;
use crate::state::AppState;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let outcome = state
        .sessions
        .signup(&req.username, &req.email, &req.password)
        .await?;

    let message = if outcome.mail_queued {
        "User Registration Successful. Check your email to activate your account."
    } else {
        "User Registration Successful. The activation email could not be sent; request a new one."
    };

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            success: true,
            user_id: outcome.user_id,
            message: message.to_string(),
            email_queued: outcome.mail_queued,
        }),
    ))
}

pub async fn verify_account(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.sessions.verify_account(&token).await?;
    Ok(Json(MessageResponse::ok("Account Activated Successfully")))
}

pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let queued = state.sessions.resend_verification(&req.email).await?;
    let message = if queued {
        "Verification email sent"
    } else {
        "Verification email could not be sent, try again later"
    };
    Ok(Json(MessageResponse::ok(message)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthenticationResponse>, ApiError> {
    let response = state.sessions.login(&req.username, &req.password).await?;
    Ok(Json(response))
}

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<AuthenticationResponse>, ApiError> {
    if req.refresh_token.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "refresh_token is required".to_string(),
        ));
    }

    let response = state
        .sessions
        .refresh(&req.refresh_token, req.username.as_deref())
        .await?;
    Ok(Json(response))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.sessions.logout(&req.refresh_token).await?;
    Ok(Json(MessageResponse::ok(
        "Refresh Token Deleted Successfully!!",
    )))
}

/// The principal behind the presented access token
pub async fn current_user(CurrentUser(principal): CurrentUser) -> Json<AuthenticatedPrincipal> {
    Json(principal)
}
