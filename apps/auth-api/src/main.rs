//! Auth API Server
//!
//! Account signup and email verification, credential login, access token
//! refresh and logout for the reddit-clone backend. Access tokens are ES256
//! JWTs signed with a key unlocked from a passphrase-protected key store at
//! startup.
//!
//! ## Commands
//!
//! - `serve` - run the HTTP server (configuration from the environment)
//! - `keygen` - write a new key store holding one P-256 signing key

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use auth_core::keys::{KeyStore, DEFAULT_PBKDF2_ITERATIONS};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod state;

use config::ServerConfig;
use state::AppState;

/// Command-line arguments for the auth server
#[derive(Parser, Debug)]
#[command(name = "auth-api")]
#[command(about = "Authentication and session server")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value = "8080")]
        port: u16,

        /// Host address to bind to
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,
    },

    /// Generate a key store with a fresh signing key
    Keygen {
        /// Where to write the key store
        #[arg(short, long, env = "KEYSTORE_PATH", default_value = "keystore.json")]
        output: PathBuf,

        /// Alias of the generated key
        #[arg(long, env = "KEY_ALIAS", default_value = "springblog")]
        alias: String,

        /// Passphrase protecting the store's integrity
        #[arg(long, env = "KEYSTORE_PASSWORD", hide_env_values = true)]
        store_password: String,

        /// Passphrase encrypting the private key (defaults to the store passphrase)
        #[arg(long, env = "KEY_PASSWORD", hide_env_values = true)]
        key_password: Option<String>,

        /// PBKDF2 iterations for the private key encryption
        #[arg(long, default_value_t = DEFAULT_PBKDF2_ITERATIONS)]
        iterations: u32,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(log_level.into())
                .add_directive("tower_http=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Serve { port, host } => serve(&host, port).await,
        Command::Keygen {
            output,
            alias,
            store_password,
            key_password,
            iterations,
            force,
        } => keygen(
            &output,
            &alias,
            &store_password,
            key_password.as_deref().unwrap_or(&store_password),
            iterations,
            force,
        ),
    }
}

async fn serve(host: &str, port: u16) -> Result<()> {
    let config = ServerConfig::from_env()?;

    info!("Initializing auth API...");
    let state = Arc::new(AppState::new(&config).await?);

    spawn_purge_task(state.clone(), config.purge_interval);

    let app = routes::build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Access token TTL: {:?}", config.access_token_ttl);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically delete expired refresh and verification tokens.
fn spawn_purge_task(state: Arc<AppState>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            match state.sessions.purge_expired().await {
                Ok((refresh, verification)) if refresh + verification > 0 => info!(
                    "Purged {} refresh and {} verification token(s)",
                    refresh, verification
                ),
                Ok(_) => {}
                Err(e) => tracing::error!("Token purge failed: {}", e),
            }
        }
    });
}

fn keygen(
    output: &Path,
    alias: &str,
    store_password: &str,
    key_password: &str,
    iterations: u32,
    force: bool,
) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let store = KeyStore::generate(alias, store_password, key_password, iterations)
        .context("Failed to generate key store")?;
    std::fs::write(output, store.to_bytes()?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Wrote key store {} with key '{}'", output.display(), alias);
    Ok(())
}
