use anyhow::{Context, Result};
use facematch_chat::{ChatEngine, OpenAiResponder};
use facematch_core::OnnxExtractor;
use facematchd::{create_router, spawn_engine, AppState, Config, FaceService};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facematchd starting");

    let config = Config::load()?;

    // Models are loaded before binding so a missing file fails startup.
    let extractor = OnnxExtractor::load(&config.models.dir)
        .with_context(|| format!("loading models from {}", config.models.dir.display()))?;
    let engine = spawn_engine(Box::new(extractor))?;
    let faces = FaceService::new(
        engine,
        config.recognize_options(),
        config.expected_dim(),
        config.request_timeout(),
    );

    if config.chat.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, /chat answers only built-in questions");
    }
    let responder = OpenAiResponder::new(config.responder_config())?;
    let chat = ChatEngine::new(Arc::new(responder), config.chat_settings());

    let state = Arc::new(AppState { faces, chat });
    let app = create_router(state, config.server.max_body_bytes);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, model_dir = %config.models.dir.display(), "facematchd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facematchd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
