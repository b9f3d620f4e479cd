//! Credential gateway - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Make sure a signing key exists
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

use std::sync::Arc;

use credential_gateway::{
    AppState, build_router,
    clients::{captcha::TurnstileVerifier, email::ResendMailer, tools::HttpToolBackend},
    config::Config,
    db,
    store::PgStore,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let mailer = Arc::new(ResendMailer::new(
        config.email_api_url.clone(),
        config.email_api_key.clone(),
        config.email_from.clone(),
    ));
    let captcha = Arc::new(TurnstileVerifier::new(
        config.captcha_verify_url.clone(),
        config.captcha_secret.clone(),
    ));
    let tools = Arc::new(HttpToolBackend::new(config.tool_backend_url.clone()));
    let port = config.server_port;

    let state = AppState::new(config, Arc::new(PgStore::new(pool)), mailer, captcha, tools);

    // First signing key is created here, not on the first login
    let key = state.keys.active_key().await?;
    tracing::info!(kid = %key.kid, "Signing key ready");

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
