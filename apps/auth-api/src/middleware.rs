//! Request authentication and route guards

use std::sync::Arc;

use auth_core::AuthenticatedPrincipal;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Attach an [`AuthenticatedPrincipal`] to the request when it carries a
/// valid bearer token. Never rejects.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Some(principal) = state.authenticator.authenticate(header).await {
        request.extensions_mut().insert(principal);
    }

    next.run(request).await
}

/// Reject requests that reached a protected route without a principal.
pub async fn require_principal(request: Request, next: Next) -> Response {
    if request
        .extensions()
        .get::<AuthenticatedPrincipal>()
        .is_none()
    {
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

/// Extractor for the principal established by [`authenticate`]
pub struct CurrentUser(pub AuthenticatedPrincipal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedPrincipal>()
            .cloned()
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}
