//! Server entry point.

use oxidata_core::{Service, ServiceConfig};
use oxidata_server::sqlite::{introspect_schema, SqliteSession};
use oxidata_server::{app, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", config.db_path))
        .await?;

    let mut session = SqliteSession::acquire(&pool).await?;
    let registry = introspect_schema(&mut session).await?;
    info!(tables = registry.tables().count(), "schema loaded");

    let service = Service::new(registry, config.clone());
    service.load_persisted_changes(&mut session).await?;
    drop(session);

    let state = Arc::new(AppState { service, pool });

    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app::router(state)).await?;
    Ok(())
}

/// Load configuration from the file named by `OXIDATA_CONFIG`, falling back
/// to defaults.
fn load_config() -> anyhow::Result<ServiceConfig> {
    match std::env::var("OXIDATA_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        Err(_) => Ok(ServiceConfig::default()),
    }
}
