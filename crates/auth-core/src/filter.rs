//! Bearer-token authentication
//!
//! Turns an `Authorization` header into an [`AuthenticatedPrincipal`], or
//! nothing. Never fails: a missing, malformed, forged or expired token simply
//! yields an unauthenticated request and the authorization layer decides
//! whether that is acceptable for the route.

use crate::error::TokenError;
use crate::token::TokenCodec;
use crate::users::{AuthenticatedPrincipal, UserStore};

/// Extract Bearer token from Authorization header
///
/// # Returns
/// * `Some(&str)` - The extracted token
/// * `None` - If the header is missing, not a bearer credential, or empty
pub fn extract_bearer_token(auth_header: Option<&str>) -> Option<&str> {
    auth_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    users: UserStore,
}

impl Authenticator {
    pub fn new(codec: TokenCodec, users: UserStore) -> Self {
        Self { codec, users }
    }

    /// Resolve the principal for an `Authorization` header value.
    pub async fn authenticate(&self, auth_header: Option<&str>) -> Option<AuthenticatedPrincipal> {
        let token = extract_bearer_token(auth_header)?;

        let claims = match self.codec.verify(token) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => {
                tracing::debug!("Rejected expired access token");
                return None;
            }
            Err(e) => {
                tracing::warn!("Rejected access token: {}", e);
                return None;
            }
        };

        match self.users.find_by_username(&claims.sub).await {
            Ok(Some(user)) => Some(AuthenticatedPrincipal::from(&user)),
            Ok(None) => {
                tracing::warn!("Access token subject {} no longer exists", claims.sub);
                None
            }
            Err(e) => {
                tracing::error!("User lookup failed during authentication: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::keys::KeyMaterial;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    async fn setup() -> (Authenticator, TokenCodec) {
        let pool = db::connect_in_memory().await.unwrap();
        let users = UserStore::new(pool);
        users.create("alice", "alice@x.com", "hash").await.unwrap();

        let codec = TokenCodec::new(
            Arc::new(KeyMaterial::generate("test")),
            Duration::minutes(15),
        );
        (Authenticator::new(codec.clone(), users), codec)
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(Some("Bearer abc123")), Some("abc123"));

        assert_eq!(extract_bearer_token(Some("abc123")), None);
        assert_eq!(extract_bearer_token(Some("Basic abc123")), None);
        assert_eq!(extract_bearer_token(Some("Bearer ")), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[tokio::test]
    async fn test_valid_token_yields_principal() {
        let (auth, codec) = setup().await;
        let token = codec.issue("alice").unwrap().token;

        let principal = auth
            .authenticate(Some(&format!("Bearer {}", token)))
            .await
            .unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.email, "alice@x.com");
    }

    #[tokio::test]
    async fn test_expired_token_is_unauthenticated() {
        let (auth, codec) = setup().await;
        let token = codec
            .sign("alice", Utc::now() - Duration::hours(2), Duration::minutes(15))
            .unwrap()
            .token;

        assert!(auth
            .authenticate(Some(&format!("Bearer {}", token)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_foreign_key_token_is_unauthenticated() {
        let (auth, _) = setup().await;
        let other = TokenCodec::new(
            Arc::new(KeyMaterial::generate("other")),
            Duration::minutes(15),
        );
        let token = other.issue("alice").unwrap().token;

        assert!(auth
            .authenticate(Some(&format!("Bearer {}", token)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_subject_is_unauthenticated() {
        let (auth, codec) = setup().await;
        let token = codec.issue("ghost").unwrap().token;

        assert!(auth
            .authenticate(Some(&format!("Bearer {}", token)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthenticated() {
        let (auth, _) = setup().await;
        assert!(auth.authenticate(None).await.is_none());
        assert!(auth.authenticate(Some("garbage")).await.is_none());
    }
}
