//! Error types for the authentication core

use thiserror::Error;

/// Failure to load signing keys at startup. Always fatal.
#[derive(Debug, Error)]
pub enum KeyLoadError {
    #[error("Failed to read key store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key store is not valid: {0}")]
    Format(String),

    #[error("Unsupported key store version: {0}")]
    UnsupportedVersion(u32),

    #[error("Key store integrity check failed (wrong store passphrase?)")]
    StoreIntegrity,

    #[error("Key alias not found in key store: {0}")]
    AliasNotFound(String),

    #[error("Failed to decrypt private key: {0}")]
    KeyDecryption(String),

    #[error("Invalid public key: {0}")]
    PublicKey(String),

    #[error("Public key does not match private key for alias {0}")]
    KeyMismatch(String),

    #[error("Failed to generate key store: {0}")]
    Generation(String),
}

/// Access token rejection reasons.
///
/// Callers may branch on the kind for logging, but the HTTP layer reports
/// every variant the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Failed to encode token: {0}")]
    Encode(String),
}

/// Mail could not be handed off or delivered.
#[derive(Debug, Clone, Error)]
pub enum MailDispatchError {
    #[error("Mail queue is full")]
    QueueFull,

    #[error("Mail queue is closed")]
    QueueClosed,

    #[error("Mail transport failed: {0}")]
    Transport(String),

    #[error("Mail delivery timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Verification token not found")]
    TokenNotFound,

    #[error("Verification token has expired")]
    VerificationExpired,

    #[error("Account is not active")]
    AccountNotActive,

    #[error("Account is already active")]
    AccountAlreadyActive,

    #[error("An account with this {0} already exists")]
    AccountExists(&'static str),

    #[error("Account not found")]
    AccountNotFound,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    MailDispatch(#[from] MailDispatchError),

    #[error("Token lifetime is out of range")]
    TokenLifetime,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
