//! DocVault API server

use docvault_api::{build_router, AppState, Settings};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| settings.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_addr = settings.bind_addr;
    tracing::info!(
        environment = %settings.environment,
        pool_size = settings.pool.max_connections,
        migrate_on_start = settings.migrate_on_start,
        "starting docvault-api"
    );

    let state = Arc::new(AppState::bootstrap(settings).await?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("DocVault API listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
