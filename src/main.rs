use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use rag_backend::core::config::AppConfig;
use rag_backend::core::logging;
use rag_backend::server;
use rag_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    logging::init(&config.log_dir);

    let port = config.port;
    let state = AppState::initialize(config).await;

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
