//! Error types for the auth API

use auth_core::{AuthError, TokenError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Auth(e) => match e {
                AuthError::Token(TokenError::Encode(_)) | AuthError::TokenLifetime => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
                AuthError::Token(_) => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
                }
                AuthError::InvalidRefreshToken => {
                    (StatusCode::UNAUTHORIZED, "INVALID_REFRESH_TOKEN")
                }
                AuthError::AccountNotActive => (StatusCode::FORBIDDEN, "ACCOUNT_NOT_ACTIVE"),
                AuthError::TokenNotFound => (StatusCode::BAD_REQUEST, "TOKEN_NOT_FOUND"),
                AuthError::VerificationExpired => {
                    (StatusCode::BAD_REQUEST, "VERIFICATION_EXPIRED")
                }
                AuthError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                AuthError::AccountExists(_) => (StatusCode::CONFLICT, "ACCOUNT_EXISTS"),
                AuthError::AccountAlreadyActive => {
                    (StatusCode::CONFLICT, "ACCOUNT_ALREADY_ACTIVE")
                }
                AuthError::AccountNotFound => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
                AuthError::MailDispatch(_)
                | AuthError::PasswordHash(_)
                | AuthError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Auth(e @ (AuthError::Token(TokenError::Encode(_))
            | AuthError::TokenLifetime
            | AuthError::MailDispatch(_)
            | AuthError::PasswordHash(_)
            | AuthError::Database(_))) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            ApiError::Auth(AuthError::Token(_)) => "Invalid or expired token".to_string(),
            ApiError::Auth(AuthError::AccountNotActive) => {
                "Please verify your email before logging in".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(json!({
            "success": false,
            "error": self.message(),
            "code": code,
        }));

        (status, body).into_response()
    }
}
