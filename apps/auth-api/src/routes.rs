//! Router assembly

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{authenticate, require_principal};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::<Arc<AppState>>::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/signup", post(handlers::signup))
        .route(
            "/api/auth/accountVerification/:token",
            get(handlers::verify_account),
        )
        .route(
            "/api/auth/resend-verification",
            post(handlers::resend_verification),
        )
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh/token", post(handlers::refresh_token))
        .route("/api/auth/logout", post(handlers::logout));

    let protected = Router::<Arc<AppState>>::new()
        .route("/api/users/me", get(handlers::current_user))
        .route_layer(middleware::from_fn(require_principal));

    Router::new()
        .merge(public)
        .merge(protected)
        // Runs on every request before routing
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
