//! ward-cloud: entitlement and MFA service
//!
//! Long-running service that:
//! - Meters plan-limited actions for subjects and guests
//! - Manages plan definitions and subject plan changes
//! - Runs MFA enrollment and step-up verification
//! - Applies plan purchases from payment notifications

mod api;
mod auth;
mod config;
mod db;
mod email;
mod error;
mod payments;
mod sms;
mod state;
mod util;

use std::net::SocketAddr;
use std::time::Duration;

use config::Config;
use state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ward_cloud=info,ward_core=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting ward-cloud (env: {})", config.environment);

    // Initialize application state
    let state = AppState::new(&config).await?;

    // Move counters of finished windows into history (hourly by default)
    let ledger = state.ledger.clone();
    let archive_every = Duration::from_secs(config.archive_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(archive_every);
        loop {
            interval.tick().await;
            match ledger.archive_stale().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(archived = n, "Archived stale usage counters"),
                Err(e) => tracing::error!(error = %e, "Usage archive failed"),
            }
        }
    });

    // Pick up operator flags written by other instances
    let refresh_state = state.clone();
    let refresh_every = Duration::from_secs(config.settings_refresh_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh_every);
        loop {
            interval.tick().await;
            refresh_settings(&refresh_state).await;
        }
    });

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("ward-cloud HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn refresh_settings(state: &AppState) {
    match db::settings::maintenance_mode(&state.pool).await {
        Ok(enabled) => {
            if state.engine.snapshot().maintenance_mode != enabled {
                state.engine.update(|c| c.maintenance_mode = enabled);
                tracing::warn!(enabled, "Maintenance mode changed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to refresh runtime settings"),
    }
}
