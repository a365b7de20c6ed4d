//! Account and session lifecycle
//!
//! signup → verification email → account activation → login →
//! access + refresh tokens → refresh → logout.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AuthError, AuthResult};
use crate::mail::{MailQueue, NotificationEmail};
use crate::password::{hash_password, validate_email, validate_username, verify_password};
use crate::refresh::RefreshTokenStore;
use crate::token::TokenCodec;
use crate::users::{User, UserStore};
use crate::verification::VerificationTokenStore;

/// Default base of the activation link; the token is appended as a path segment
pub const DEFAULT_ACTIVATION_BASE_URL: &str = "http://localhost:8080/api/auth/accountVerification";

/// Result of a successful signup
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub user_id: String,
    pub verification_token: String,
    /// False when the activation email could not be queued
    pub mail_queued: bool,
}

/// Tokens handed back after login or refresh
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationResponse {
    pub authentication_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct SessionService {
    codec: TokenCodec,
    users: UserStore,
    refresh_tokens: RefreshTokenStore,
    verification_tokens: VerificationTokenStore,
    mail: MailQueue,
    activation_base_url: String,
}

impl SessionService {
    pub fn new(
        codec: TokenCodec,
        users: UserStore,
        refresh_tokens: RefreshTokenStore,
        verification_tokens: VerificationTokenStore,
        mail: MailQueue,
        activation_base_url: impl Into<String>,
    ) -> Self {
        Self {
            codec,
            users,
            refresh_tokens,
            verification_tokens,
            mail,
            activation_base_url: activation_base_url.into(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    pub fn verification_tokens(&self) -> &VerificationTokenStore {
        &self.verification_tokens
    }

    fn activation_url(&self, token: &str) -> String {
        format!("{}/{}", self.activation_base_url.trim_end_matches('/'), token)
    }

    /// Queue the activation email for `token`. Returns whether it was queued.
    fn queue_activation(&self, user: &User, token: &str) -> bool {
        let email = NotificationEmail::activation(&user.email, &self.activation_url(token));

        match self.mail.enqueue(email) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Could not queue activation email for {}: {}", user.username, e);
                false
            }
        }
    }

    /// Create a disabled account and send its activation email.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<SignupOutcome> {
        let username = username.trim();
        validate_username(username)?;
        validate_email(email)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("Password is required".to_string()));
        }

        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::AccountExists("username"));
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::AccountExists("email"));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::PasswordHash(e.to_string()))??;

        let (user, verification) = match self
            .users
            .create_with_verification(username, email, &password_hash, &self.verification_tokens)
            .await
        {
            Ok(created) => created,
            // Lost a race with a concurrent signup for the same name or address
            Err(AuthError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
                return Err(AuthError::AccountExists("username or email"))
            }
            Err(e) => return Err(e),
        };

        let mail_queued = self.queue_activation(&user, &verification.token);

        tracing::info!("User registered: {} (mail queued: {})", user.username, mail_queued);

        Ok(SignupOutcome {
            user_id: user.id,
            verification_token: verification.token,
            mail_queued,
        })
    }

    /// Activate the account a verification token was issued for.
    pub async fn verify_account(&self, token: &str) -> AuthResult<User> {
        let user_id = self.verification_tokens.consume(token).await?;

        let user = self
            .users
            .find_by_id(&user_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !self.users.activate(&user.id).await? {
            return Err(AuthError::AccountAlreadyActive);
        }

        tracing::info!("Account activated: {}", user.username);
        Ok(User {
            enabled: true,
            ..user
        })
    }

    /// Send a fresh activation email to an account that is not yet active.
    pub async fn resend_verification(&self, email: &str) -> AuthResult<bool> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if user.enabled {
            return Err(AuthError::AccountAlreadyActive);
        }

        let verification = self.verification_tokens.issue(&user.id).await?;
        Ok(self.queue_activation(&user, &verification.token))
    }

    /// Check credentials and mint an access + refresh token pair.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<AuthenticationResponse> {
        let user = self
            .users
            .find_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?;

        if !valid {
            tracing::info!("Failed login for {}", user.username);
            return Err(AuthError::InvalidCredentials);
        }

        if !user.enabled {
            tracing::info!("Login refused for unverified account {}", user.username);
            return Err(AuthError::AccountNotActive);
        }

        let access = self.codec.issue(&user.username)?;
        let refresh = self.refresh_tokens.generate(&user.username).await?;

        tracing::info!("User logged in: {}", user.username);

        Ok(AuthenticationResponse {
            authentication_token: access.token,
            refresh_token: refresh.token,
            expires_at: access.expires_at,
            username: user.username,
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself is returned unchanged. When `username` is
    /// given it must match the account the token was issued to.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        username: Option<&str>,
    ) -> AuthResult<AuthenticationResponse> {
        let refresh = self.refresh_tokens.validate(refresh_token).await?;

        if let Some(claimed) = username {
            if claimed.trim() != refresh.username {
                tracing::warn!(
                    "Refresh token for {} presented with username {}",
                    refresh.username,
                    claimed
                );
                return Err(AuthError::InvalidRefreshToken);
            }
        }

        let access = self.codec.issue(&refresh.username)?;

        Ok(AuthenticationResponse {
            authentication_token: access.token,
            refresh_token: refresh.token,
            expires_at: access.expires_at,
            username: refresh.username,
        })
    }

    /// Delete a refresh token. Unknown tokens are ignored.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        self.refresh_tokens.delete(refresh_token).await
    }

    /// Remove expired refresh and verification tokens.
    pub async fn purge_expired(&self) -> AuthResult<(u64, u64)> {
        let now = Utc::now();
        let refresh = self.refresh_tokens.purge_expired(now).await?;
        let verification = self.verification_tokens.purge_expired(now).await?;
        Ok((refresh, verification))
    }
}
