//! One-time account verification tokens

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{AuthError, AuthResult};

/// Default verification token lifetime (24 hours)
pub const DEFAULT_VERIFICATION_TTL_SECS: i64 = 24 * 60 * 60;

/// Token handed to the user in the activation link
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerificationTokenStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl VerificationTokenStore {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Build a token for `user_id` without persisting it.
    pub fn new_token(&self, user_id: &str) -> AuthResult<VerificationToken> {
        let now = Utc::now();
        Ok(VerificationToken {
            token: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now
                .checked_add_signed(self.ttl)
                .ok_or(AuthError::TokenLifetime)?,
        })
    }

    /// Generate and persist a token for `user_id`.
    pub async fn issue(&self, user_id: &str) -> AuthResult<VerificationToken> {
        let verification = self.new_token(user_id)?;
        let mut conn = self.pool.acquire().await?;
        insert(&mut *conn, &verification).await?;
        Ok(verification)
    }

    pub async fn consume(&self, token: &str) -> AuthResult<String> {
        self.consume_at(token, Utc::now()).await
    }

    /// Delete `token` and return the user it belongs to.
    ///
    /// The delete and the read are one statement, so concurrent callers
    /// presenting the same token cannot both succeed.
    pub async fn consume_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<String> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "DELETE FROM verification_tokens WHERE token = ? RETURNING user_id, expires_at",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let (user_id, expires_at) = row.ok_or(AuthError::TokenNotFound)?;

        if expires_at <= now {
            tracing::info!("Verification token for user {} has expired", user_id);
            return Err(AuthError::VerificationExpired);
        }

        Ok(user_id)
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Persist `verification` on `conn`, which may be inside a transaction.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    verification: &VerificationToken,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO verification_tokens (token, user_id, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&verification.token)
    .bind(&verification.user_id)
    .bind(verification.created_at)
    .bind(verification.expires_at)
    .execute(conn)
    .await?;
    Ok(())
}
