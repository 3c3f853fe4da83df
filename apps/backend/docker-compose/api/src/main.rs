#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use axum::{Router, middleware::from_fn, routing::get};
use corestone_api::{config::ApiConfig, construct_router, schema::ensure_schema, state::State};

mod config;
mod metrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    metrics::init_telemetry()?;

    tracing::info!("Starting CorestoneGrader API");

    let config = config::Config::from_env()?;
    let api_config = ApiConfig::from_env()?;

    let state = Arc::new(State::new(api_config).await?);
    ensure_schema(&state.db).await?;
    tracing::info!("Database schema ready");

    let app = Router::new()
        .merge(construct_router(state))
        .route_layer(from_fn(metrics::track_http))
        .route("/metrics", get(metrics::handler));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
