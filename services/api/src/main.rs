mod config;
mod routes;

use crate::config::{Config, StoreBackend};
use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::fmt::time::ChronoLocal;
use vivavoce_core::InterviewEngine;
use vivavoce_core::generation::GeminiClient;
use vivavoce_core::speech::ElevenLabsClient;
use vivavoce_core::store::{KvRestStore, MemoryStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview service...");

    // --- 3. Initialize Backend Clients ---
    let generator = Arc::new(GeminiClient::new(config.gemini.clone()));
    let speech = Arc::new(ElevenLabsClient::new(config.elevenlabs.clone()));

    tracing::info!("Session store backend: {}", config.store.name());
    let store: Arc<dyn SessionStore> = match config.store {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Kv { url, token } => Arc::new(KvRestStore::new(url, token)),
    };

    let engine = Arc::new(InterviewEngine::new(generator, speech, store));

    // Permissive CORS so a separately served frontend can call the API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(engine).layer(cors);

    tracing::info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
