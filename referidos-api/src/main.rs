//! referidos-api - Referral program HTTP service
//!
//! Configuration priority: command line > environment > TOML file > defaults.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use referidos_api::identity::{GoTrueClient, IdentityProvider, UnconfiguredIdentityProvider};
use referidos_api::mailer::{DisabledMailer, Mailer, ResendMailer};
use referidos_api::{build_router, AppState};
use referidos_common::config::{load_toml_tier, ConfigOverrides, ServiceConfig};
use referidos_common::db::init_database;

/// Command-line arguments for referidos-api
#[derive(Parser, Debug)]
#[command(name = "referidos-api")]
#[command(about = "Referral program HTTP service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "REFERIDOS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(short, long, env = "REFERIDOS_BIND_ADDR")]
    bind: Option<String>,

    /// SQLite database file
    #[arg(short, long, env = "REFERIDOS_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Base URL of the GoTrue-compatible auth service
    #[arg(long, env = "REFERIDOS_AUTH_URL")]
    auth_url: Option<String>,

    /// API key sent to the auth service
    #[arg(long, env = "REFERIDOS_AUTH_API_KEY", hide_env_values = true)]
    auth_api_key: Option<String>,

    /// Resend API key; email is disabled without it
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    resend_api_key: Option<String>,

    /// Sender address for notification emails
    #[arg(long, env = "EMAIL_FROM")]
    email_from: Option<String>,

    /// Internal mailbox notified of every new referral
    #[arg(long, env = "EMAIL_INTERNAL_TO")]
    email_internal_to: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "REFERIDOS_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_addr: self.bind.clone(),
            database_path: self.database.clone(),
            auth_url: self.auth_url.clone(),
            auth_api_key: self.auth_api_key.clone(),
            resend_api_key: self.resend_api_key.clone(),
            email_from: self.email_from.clone(),
            email_internal_to: self.email_internal_to.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

fn identity_provider(config: &ServiceConfig) -> Result<Arc<dyn IdentityProvider>> {
    match &config.auth.url {
        Some(url) => {
            let client = GoTrueClient::new(url.clone(), config.auth.api_key.clone())
                .context("Failed to build auth client")?;
            info!("Auth service: {}", url);
            Ok(Arc::new(client))
        }
        None => {
            warn!("No auth URL configured: tokens will not resolve, admin endpoints will reject every request");
            Ok(Arc::new(UnconfiguredIdentityProvider))
        }
    }
}

fn mailer(config: &ServiceConfig) -> Result<Arc<dyn Mailer>> {
    match &config.email.resend_api_key {
        Some(key) => {
            let client = ResendMailer::new(key.clone()).context("Failed to build email client")?;
            Ok(Arc::new(client))
        }
        None => {
            warn!("No Resend API key configured: notification emails are disabled");
            Ok(Arc::new(DisabledMailer))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = load_toml_tier(args.config.as_deref()).context("Failed to load configuration file")?;
    let config = ServiceConfig::resolve(args.overrides(), toml);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "referidos_api={lvl},referidos_common={lvl},tower_http={lvl}",
                    lvl = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting referidos-api v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config.summary());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database ready: {}", config.database_path.display());

    let state = AppState::new(
        pool,
        identity_provider(&config)?,
        mailer(&config)?,
        config.email.clone(),
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("referidos-api listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
