//! Riskpulse - patient risk analytics for care teams.
//!
//! # API Endpoints
//!
//! - `GET /patients/:id/deterioration` - Health deterioration score
//! - `GET /patients/:id/engagement` - Engagement momentum score
//! - `GET /patients/:id/risk` - Combined risk with recommended actions
//! - `GET /roster` - Every patient ranked by combined risk
//! - `GET /roster/summary` - Roster counts by risk level
//! - `GET /roster/latest` - Last computed roster report
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use riskpulse::api::{AppState, router};
use riskpulse::config::Config;
use riskpulse::refresh::spawn_roster_refresh;
use riskpulse::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Patient identifiers appear in info-level fields; keep debug detail opt-in.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("riskpulse=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(
        port = config.port,
        db_url = %config.database_url,
        refresh_interval = ?config.refresh_interval,
        "Starting riskpulse server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let state = AppState::new(storage);

    match config.refresh_interval {
        Some(period) => {
            spawn_roster_refresh(state.storage.clone(), state.latest_roster.clone(), period);
            info!(period_secs = period.as_secs(), "Roster refresh enabled");
        }
        None => info!("Roster refresh disabled"),
    }

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Riskpulse is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
