//! Application state for the auth server

use std::sync::Arc;

use anyhow::{Context, Result};
use auth_core::mail::{LogTransport, MailTransport, ResendTransport};
use auth_core::{
    db, Authenticator, KeyMaterial, MailQueue, RefreshTokenStore, SessionService, TokenCodec,
    UserStore, VerificationTokenStore,
};
use sqlx::SqlitePool;

use crate::config::ServerConfig;

pub struct AppState {
    pub sessions: SessionService,
    pub authenticator: Authenticator,
    pub db: SqlitePool,
}

impl AppState {
    /// Open the database, unlock the signing key and start the mail worker.
    pub async fn new(config: &ServerConfig) -> Result<Self> {
        let pool = db::connect(&config.database_url, config.max_connections)
            .await
            .context("Failed to connect to database")?;
        db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        let keys = KeyMaterial::load(
            &config.keystore_path,
            &config.keystore_password,
            &config.key_alias,
            &config.key_password,
        )
        .with_context(|| format!("Failed to load key store {}", config.keystore_path.display()))?;

        let transport: Arc<dyn MailTransport> = match &config.resend_api_key {
            Some(api_key) => {
                tracing::info!("Mail delivery via Resend");
                Arc::new(ResendTransport::new(api_key.clone(), config.mail_from.clone()))
            }
            None => {
                tracing::warn!("RESEND_API_KEY not set, activation mail will only be logged");
                Arc::new(LogTransport)
            }
        };

        Self::assemble(pool, Arc::new(keys), transport, config)
    }

    /// Wire the services together from already-prepared parts.
    pub fn assemble(
        pool: SqlitePool,
        keys: Arc<KeyMaterial>,
        transport: Arc<dyn MailTransport>,
        config: &ServerConfig,
    ) -> Result<Self> {
        let codec = TokenCodec::new(keys, chrono_duration(config.access_token_ttl)?);
        let users = UserStore::new(pool.clone());

        // The worker runs detached until the last queue handle is dropped.
        let (mail, _worker) =
            MailQueue::start(transport, config.mail_queue_capacity, config.mail_send_timeout);

        let sessions = SessionService::new(
            codec.clone(),
            users.clone(),
            RefreshTokenStore::new(pool.clone(), chrono_duration(config.refresh_token_ttl)?),
            VerificationTokenStore::new(
                pool.clone(),
                chrono_duration(config.verification_token_ttl)?,
            ),
            mail,
            config.activation_base_url.clone(),
        );

        Ok(Self {
            sessions,
            authenticator: Authenticator::new(codec, users),
            db: pool,
        })
    }
}

fn chrono_duration(duration: std::time::Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration).context("Duration out of range")
}
