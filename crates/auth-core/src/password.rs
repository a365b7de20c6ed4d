//! Credential handling for signup and login
//!
//! Passwords are stored as Argon2id PHC strings. Usernames and emails get a
//! shape check before an account is created.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{AuthError, AuthResult};

/// Maximum username length
pub const MAX_USERNAME_LEN: usize = 50;

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// True when `password` matches the stored PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn invalid(message: impl Into<String>) -> AuthError {
    AuthError::InvalidInput(message.into())
}

pub fn validate_username(username: &str) -> AuthResult<()> {
    let username = username.trim();

    if username.is_empty() {
        return Err(invalid("Username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(invalid(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("Username cannot contain whitespace"));
    }

    Ok(())
}

/// `local@domain.tld`, one `@`, no whitespace.
pub fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| invalid("Email must contain @"))?;

    let domain_ok = domain
        .split_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());

    if local.is_empty()
        || domain.contains('@')
        || !domain_ok
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid("Email address is not valid"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("pw").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("pw", &hash));
        assert!(!verify_password("Pw", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let first = hash_password("pw").unwrap();
        let second = hash_password("pw").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("pw", &second));
    }

    #[test]
    fn test_unparseable_hash_never_matches() {
        assert!(!verify_password("pw", "not-a-phc-string"));
        assert!(!verify_password("pw", ""));
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username(" alice ").is_ok());

        for bad in ["", "   ", "al ice", "tab\tname"] {
            assert!(
                matches!(validate_username(bad), Err(AuthError::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LEN)).is_ok());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("alice@x.com").is_ok());
        assert!(validate_email(" alice@x.com ").is_ok());

        for bad in [
            "alice",
            "@x.com",
            "alice@",
            "alice@localhost",
            "alice@.com",
            "alice@x.",
            "a@b@x.com",
            "al ice@x.com",
        ] {
            assert!(validate_email(bad).is_err(), "{:?} should be rejected", bad);
        }
    }
}
