use anyhow::Context;
use std::net::SocketAddr;
use tembea_api::{app, worker, AppState};
use tembea_store::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tembea_api=debug,tembea_payments=debug,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        "Starting Tembea payments on port {} ({:?} providers)",
        config.server.port,
        config.providers.environment
    );

    let app_state = AppState::from_config(&config).context("Invalid payment configuration")?;

    // Notification hand-off
    tokio::spawn(worker::start_notification_worker(app_state.events.subscribe()));

    // Expiry sweeper, 0 disables
    let sweep_seconds = config.payments.sweep_interval_seconds;
    if sweep_seconds > 0 {
        tokio::spawn(worker::start_expiry_sweeper(
            app_state.clone(),
            tokio::time::Duration::from_secs(sweep_seconds),
        ));
    }

    if app_state.simulation_enabled {
        tracing::warn!("Payment simulation endpoints are enabled");
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
