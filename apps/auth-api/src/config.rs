//! Server configuration read from the environment

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use auth_core::mail::DEFAULT_FROM_ADDRESS;
use auth_core::session::DEFAULT_ACTIVATION_BASE_URL;

/// Runtime configuration for the auth server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite connection string
    pub database_url: String,
    pub max_connections: u32,

    /// Key store file and the passphrases protecting it
    pub keystore_path: PathBuf,
    pub keystore_password: String,
    pub key_alias: String,
    pub key_password: String,

    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub verification_token_ttl: Duration,

    /// Base URL of the activation link; the token is appended as a path segment
    pub activation_base_url: String,

    pub mail_from: String,
    /// Resend API key. Mail is only logged when unset.
    pub resend_api_key: Option<String>,
    pub mail_queue_capacity: usize,
    pub mail_send_timeout: Duration,

    /// How often expired refresh and verification tokens are deleted
    pub purge_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:auth.db?mode=rwc".to_string(),
            max_connections: 5,
            keystore_path: PathBuf::from("keystore.json"),
            keystore_password: String::new(),
            key_alias: "springblog".to_string(),
            key_password: String::new(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            verification_token_ttl: Duration::from_secs(24 * 60 * 60),
            activation_base_url: DEFAULT_ACTIVATION_BASE_URL.to_string(),
            mail_from: DEFAULT_FROM_ADDRESS.to_string(),
            resend_api_key: None,
            mail_queue_capacity: 100,
            mail_send_timeout: Duration::from_secs(10),
            purge_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// `KEYSTORE_PASSWORD` is required. `KEY_PASSWORD` defaults to the store
    /// password.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(n) = var("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = n
                .trim()
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;
        }

        if let Some(path) = var("KEYSTORE_PATH") {
            config.keystore_path = PathBuf::from(path);
        }
        config.keystore_password =
            var("KEYSTORE_PASSWORD").ok_or_else(|| anyhow!("KEYSTORE_PASSWORD must be set"))?;
        if let Some(alias) = var("KEY_ALIAS") {
            config.key_alias = alias;
        }
        config.key_password =
            var("KEY_PASSWORD").unwrap_or_else(|| config.keystore_password.clone());

        if let Some(ttl) = var("ACCESS_TOKEN_TTL") {
            config.access_token_ttl = duration_var("ACCESS_TOKEN_TTL", &ttl)?;
        }
        if let Some(ttl) = var("REFRESH_TOKEN_TTL") {
            config.refresh_token_ttl = duration_var("REFRESH_TOKEN_TTL", &ttl)?;
        }
        if let Some(ttl) = var("VERIFICATION_TOKEN_TTL") {
            config.verification_token_ttl = duration_var("VERIFICATION_TOKEN_TTL", &ttl)?;
        }

        if let Some(url) = var("ACTIVATION_BASE_URL") {
            config.activation_base_url = url;
        }
        if let Some(from) = var("MAIL_FROM") {
            config.mail_from = from;
        }
        config.resend_api_key = var("RESEND_API_KEY");
        if let Some(capacity) = var("MAIL_QUEUE_CAPACITY") {
            config.mail_queue_capacity = capacity
                .trim()
                .parse()
                .context("MAIL_QUEUE_CAPACITY must be a positive integer")?;
        }
        if let Some(timeout) = var("MAIL_SEND_TIMEOUT") {
            config.mail_send_timeout = duration_var("MAIL_SEND_TIMEOUT", &timeout)?;
        }
        if let Some(interval) = var("PURGE_INTERVAL") {
            config.purge_interval = duration_var("PURGE_INTERVAL", &interval)?;
        }

        Ok(config)
    }
}

/// Upper bound for any configured duration (10 years)
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

fn duration_var(key: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .ok_or_else(|| anyhow!("{} has an invalid duration: {:?}", key, value))?;
    if duration.is_zero() {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    if duration > MAX_DURATION {
        return Err(anyhow!("{} must be at most {}s", key, MAX_DURATION.as_secs()));
    }
    Ok(duration)
}

/// Parse a duration string (e.g. "900000ms", "30s", "15m", "1h", "30d")
///
/// A bare number is seconds. Returns `None` for anything else.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let (num_str, multiplier_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60 * 1000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60 * 1000)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60 * 1000)
    } else {
        (s.as_str(), 1000)
    };

    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier_ms))
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("900000ms"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30d"), Some(Duration::from_secs(30 * 86400)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration(" 2H "), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("-5m"), None);
        assert_eq!(parse_duration("1.5h"), None);
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("KEYSTORE_PASSWORD", "secret")])).unwrap();

        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.key_alias, "springblog");
        assert_eq!(config.key_password, "secret");
        assert!(config.resend_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("KEYSTORE_PASSWORD", "secret"),
            ("KEY_PASSWORD", "other"),
            ("KEY_ALIAS", "main"),
            ("ACCESS_TOKEN_TTL", "5m"),
            ("REFRESH_TOKEN_TTL", "7d"),
            ("MAIL_QUEUE_CAPACITY", "10"),
            ("RESEND_API_KEY", "re_123"),
        ]))
        .unwrap();

        assert_eq!(config.key_password, "other");
        assert_eq!(config.key_alias, "main");
        assert_eq!(config.access_token_ttl, Duration::from_secs(300));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(7 * 86400));
        assert_eq!(config.mail_queue_capacity, 10);
        assert_eq!(config.resend_api_key.as_deref(), Some("re_123"));
    }

    #[test]
    fn test_missing_keystore_password() {
        assert!(ServerConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let result = ServerConfig::from_lookup(lookup(&[
            ("KEYSTORE_PASSWORD", "secret"),
            ("ACCESS_TOKEN_TTL", "soon"),
        ]));
        assert!(result.is_err());

        let result = ServerConfig::from_lookup(lookup(&[
            ("KEYSTORE_PASSWORD", "secret"),
            ("ACCESS_TOKEN_TTL", "0s"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_duration_rejected() {
        for key in ["ACCESS_TOKEN_TTL", "REFRESH_TOKEN_TTL", "VERIFICATION_TOKEN_TTL"] {
            let result = ServerConfig::from_lookup(lookup(&[
                ("KEYSTORE_PASSWORD", "secret"),
                (key, "100000000d"),
            ]));
            assert!(result.is_err(), "{} should be rejected", key);
        }

        let config = ServerConfig::from_lookup(lookup(&[
            ("KEYSTORE_PASSWORD", "secret"),
            ("REFRESH_TOKEN_TTL", "3650d"),
        ]))
        .unwrap();
        assert_eq!(config.refresh_token_ttl, MAX_DURATION);
    }
}
