mod analysis;
mod config;
mod errors;
mod interview;
mod llm_client;
mod rag;
mod routes;
mod speech;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::create_generator;
use crate::rag::embedding::create_embedder;
use crate::routes::build_router;
use crate::speech::create_transcriber;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Embeddings: the index dimension is fixed from this provider for the process lifetime
    let embedder = create_embedder(&config.embedding)?;
    info!(
        "Embedding provider initialized (model: {}, dims: {})",
        embedder.model_name(),
        embedder.dims()
    );

    // Question generation (disabled without an API key; turns then use static questions)
    let generator = create_generator(&config.llm)?;

    // Speech-to-text (disabled without STT_URL)
    let transcriber = create_transcriber(&config.speech)?;

    info!(
        "RAG settings: chunk_size={}, overlap={}, top_k={}",
        config.rag.chunk.chunk_size(),
        config.rag.chunk.overlap(),
        config.rag.top_k
    );

    let state = AppState::new(config.clone(), embedder, generator, transcriber);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
