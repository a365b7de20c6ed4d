//! Refresh token store
//!
//! Refresh tokens are 128-bit random hex strings. Each row records the
//! username it was issued to and when it stops being accepted.

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use sqlx::{FromRow, SqlitePool};

use crate::error::{AuthError, AuthResult};

/// Default refresh token lifetime (30 days)
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Persisted refresh token
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
    ttl: Duration,
}

/// 16 bytes from the OS RNG, hex encoded
fn random_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create and persist a new refresh token bound to `username`.
    pub async fn generate(&self, username: &str) -> AuthResult<RefreshToken> {
        let now = Utc::now();
        let refresh = RefreshToken {
            token: random_token(),
            username: username.to_string(),
            created_at: now,
            expires_at: now
                .checked_add_signed(self.ttl)
                .ok_or(AuthError::TokenLifetime)?,
        };

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, username, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&refresh.token)
        .bind(&refresh.username)
        .bind(refresh.created_at)
        .bind(refresh.expires_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Issued refresh token for {}", username);
        Ok(refresh)
    }

    pub async fn validate(&self, token: &str) -> AuthResult<RefreshToken> {
        self.validate_at(token, Utc::now()).await
    }

    /// Look up `token`; absent or expired tokens are rejected.
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<RefreshToken> {
        let refresh: Option<RefreshToken> = sqlx::query_as(
            r#"
            SELECT token, username, created_at, expires_at
            FROM refresh_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let refresh = refresh.ok_or(AuthError::InvalidRefreshToken)?;

        if refresh.expires_at <= now {
            tracing::debug!("Refresh token for {} has expired", refresh.username);
            return Err(AuthError::InvalidRefreshToken);
        }

        Ok(refresh)
    }

    /// Remove `token`. Deleting an unknown token is not an error.
    pub async fn delete(&self, token: &str) -> AuthResult<()> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Deleted {} refresh token(s)", result.rows_affected());
        Ok(())
    }

    /// Drop every token that expired at or before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::collections::HashSet;

    async fn store() -> RefreshTokenStore {
        RefreshTokenStore::new(
            db::connect_in_memory().await.unwrap(),
            Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
        )
    }

    #[tokio::test]
    async fn test_generate_then_validate() {
        let store = store().await;
        let refresh = store.generate("alice").await.unwrap();

        assert_eq!(refresh.token.len(), 32);
        let found = store.validate(&refresh.token).await.unwrap();
        assert_eq!(found.username, "alice");
    }

    #[tokio::test]
    async fn test_delete_then_validate_fails() {
        let store = store().await;
        let refresh = store.generate("alice").await.unwrap();

        store.delete(&refresh.token).await.unwrap();
        let err = store.validate(&refresh.token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_ok() {
        let store = store().await;
        store.delete("does-not-exist").await.unwrap();
        store.delete("does-not-exist").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_token_invalid() {
        let store = store().await;
        let err = store.validate("deadbeef").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_expired_token_invalid() {
        let store = store().await;
        let refresh = store.generate("alice").await.unwrap();

        let later = refresh.expires_at + Duration::seconds(1);
        let err = store.validate_at(&refresh.token, later).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = store().await;
        let refresh = store.generate("alice").await.unwrap();

        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 0);
        let later = refresh.expires_at + Duration::seconds(1);
        assert_eq!(store.purge_expired(later).await.unwrap(), 1);
        assert!(store.validate(&refresh.token).await.is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_an_error() {
        let store = RefreshTokenStore::new(
            db::connect_in_memory().await.unwrap(),
            Duration::days(100_000_000),
        );

        let err = store.generate("alice").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenLifetime));
    }

    #[tokio::test]
    async fn test_concurrent_generate_unique() {
        let store = store().await;
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.generate(&format!("user{}", i)).await })
            })
            .collect();

        let mut tokens = HashSet::new();
        for handle in handles {
            tokens.insert(handle.await.unwrap().unwrap().token);
        }
        assert_eq!(tokens.len(), 20);
    }
}
