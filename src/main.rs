use std::sync::Arc;

use anyhow::Error;
use candle_core::Device;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use paraphrase_serve::api::server::create_router;
use paraphrase_serve::config::ServerConfig;
use paraphrase_serve::error::ParaphraseError;
use paraphrase_serve::llm::resource::ModelResource;
use paraphrase_serve::llm::t5::T5Loader;
use paraphrase_serve::AppState;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let device = if config.cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available(0)?
    };
    tracing::info!("Device: {:?}", device);

    let resource = Arc::new(ModelResource::new(T5Loader::from_config(&config, device)));

    // The listener is only bound once the model is ready; a failed load exits the process.
    let loading = Arc::clone(&resource);
    tokio::task::spawn_blocking(move || loading.initialize())
        .await?
        .map_err(ParaphraseError::from)?;

    let state = Arc::new(AppState::new(resource, config.request_timeout()));
    let app = create_router(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
