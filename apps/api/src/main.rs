mod config;
mod errors;
mod generation;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::{GeminiGateway, ModelGateway};
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::session::SessionStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the model gateway, shared by every pipeline component
    let gateway: Arc<dyn ModelGateway> = Arc::new(
        GeminiGateway::new(config.gemini_api_key.clone())?
            .with_base_url(config.gemini_base_url.clone())
            .with_models(
                config.gemini_text_model.clone(),
                config.gemini_image_model.clone(),
            ),
    );
    info!(
        "Gemini gateway initialized (text: {}, image: {})",
        config.gemini_text_model, config.gemini_image_model
    );

    let patch_config = config.patch_config();
    info!(
        "Image patching: {} retries, {}ms backoff unit, reject identical output: {}",
        patch_config.max_retries,
        patch_config.retry_base_delay.as_millis(),
        patch_config.reject_identical_output
    );

    let sessions = Arc::new(SessionStore::new());
    let _sweeper = sessions.spawn_sweeper(config.session_ttl(), config.session_sweep_period());
    info!(
        "Idle sessions expire after {}s (checked every {}s)",
        config.session_ttl_secs,
        config.session_sweep_period().as_secs()
    );

    // Build app state
    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(gateway, patch_config)),
        sessions,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
