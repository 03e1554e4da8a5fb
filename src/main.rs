use fat_tracker::backend::{self, BackendState};
use fat_tracker::config::{API_BASE_PATH, BackendConfig};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = BackendConfig::from_env();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = BackendState::open(config).await?;
    let app = backend::router(state);

    info!("listening on http://{addr}{API_BASE_PATH}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
