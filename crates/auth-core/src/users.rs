//! User identity store

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::error::AuthResult;
use crate::verification::{self, VerificationToken, VerificationTokenStore};

/// Account record
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    /// False until the email address has been verified
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Identity attached to a request after its access token was accepted.
///
/// Lives for one request only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedPrincipal {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

impl From<&User> for AuthenticatedPrincipal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

const SELECT_USER: &str =
    "SELECT id, username, email, password_hash, enabled, created_at FROM users";

#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("{} WHERE username = ?", SELECT_USER))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    /// Emails are stored lowercased, so lookups are case-insensitive.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("{} WHERE email = ?", SELECT_USER))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("{} WHERE id = ?", SELECT_USER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Insert a new, not yet enabled account.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let user = new_user(username, email, password_hash);
        let mut conn = self.pool.acquire().await?;
        insert(&mut *conn, &user).await?;

        tracing::info!("Created user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Insert a new account and its first verification token in one
    /// transaction. Either both rows are written or neither is.
    pub async fn create_with_verification(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        verification_tokens: &VerificationTokenStore,
    ) -> AuthResult<(User, VerificationToken)> {
        let user = new_user(username, email, password_hash);
        let verification = verification_tokens.new_token(&user.id)?;

        let mut tx = self.pool.begin().await?;
        insert(&mut *tx, &user).await?;
        verification::insert(&mut *tx, &verification).await?;
        tx.commit().await?;

        tracing::info!("Created user {} ({})", user.username, user.id);
        Ok((user, verification))
    }

    /// Enable an account. Returns false if it was already enabled or does not exist.
    pub async fn activate(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET enabled = 1 WHERE id = ? AND enabled = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn new_user(username: &str, email: &str, password_hash: &str) -> User {
    User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.trim().to_lowercase(),
        password_hash: password_hash.to_string(),
        enabled: false,
        created_at: Utc::now(),
    }
}

async fn insert(conn: &mut SqliteConnection, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, password_hash, enabled, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.enabled)
    .bind(user.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = UserStore::new(db::connect_in_memory().await.unwrap());
        let created = store
            .create("alice", "Alice@X.com", "$argon2id$hash")
            .await
            .unwrap();

        assert!(!created.enabled);
        assert_eq!(created.email, "alice@x.com");

        let by_name = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        let by_email = store.find_by_email("ALICE@x.com ").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");

        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_once() {
        let store = UserStore::new(db::connect_in_memory().await.unwrap());
        let user = store.create("alice", "alice@x.com", "hash").await.unwrap();

        assert!(store.activate(&user.id).await.unwrap());
        assert!(!store.activate(&user.id).await.unwrap());
        assert!(store.find_by_id(&user.id).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = UserStore::new(db::connect_in_memory().await.unwrap());
        store.create("alice", "alice@x.com", "hash").await.unwrap();

        let err = store
            .create("alice", "other@x.com", "hash")
            .await
            .unwrap_err();
        let is_unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
        assert!(is_unique);
    }

    #[tokio::test]
    async fn test_create_with_verification_rolls_back() {
        let pool = db::connect_in_memory().await.unwrap();
        let store = UserStore::new(pool.clone());
        let tokens = VerificationTokenStore::new(pool.clone(), chrono::Duration::hours(24));

        let (user, verification) = store
            .create_with_verification("alice", "alice@x.com", "hash", &tokens)
            .await
            .unwrap();
        assert_eq!(tokens.consume(&verification.token).await.unwrap(), user.id);

        sqlx::query("DROP TABLE verification_tokens")
            .execute(&pool)
            .await
            .unwrap();
        let result = store
            .create_with_verification("bob", "bob@x.com", "hash", &tokens)
            .await;
        assert!(result.is_err());
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }
}
