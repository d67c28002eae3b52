#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;

use fleet_server::{build_app, state::AppState};

#[derive(Parser, Debug)]
#[command(name = "fleet-server", version, about = "Fleet intelligence backend")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = fleet_config::load_config().context("load configuration")?;
    for warning in fleet_config::validate_config(&config).context("validate configuration")? {
        tracing::warn!(%warning, "configuration warning");
    }

    fleet_telemetry::init_tracing(&config).map_err(anyhow::Error::msg).context("init tracing")?;

    let db = fleet_db::Db::connect(&config).await.context("connect to database")?;
    db.migrate(&config.app_role).await.context("run database migrations")?;

    let state = AppState::new(db, config);
    fleet_session::reaper::spawn(state.sessions.clone());

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    tracing::info!(bind = %args.bind, "fleet-server listening");

    axum::serve(listener, app).await.context("serve")
}
