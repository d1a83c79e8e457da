//! Mitaan Express CMS server

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mitaan::{
    api::{self, AppState},
    config::Config,
    db,
    services::storage::R2ObjectStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mitaan=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mitaan Express...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let remote = R2ObjectStore::from_config(&config.storage).map(R2ObjectStore::boxed);
    if remote.is_some() {
        tracing::info!("Object storage enabled");
    } else {
        tracing::warn!("Object storage not configured, uploads are kept on local disk");
    }

    let state = AppState::build(pool, &config, remote).await?;
    state.user_service.bootstrap_admin(&config.admin).await?;

    let app = api::build_router(state, &config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
