//! Lexicon HTTP server binary.
//!
//! Serves the JSON API and the browser form on `0.0.0.0:$APP_PORT`.
//!
//! # Environment Variables
//!
//! - `APP_PORT` - HTTP port (default: 8000)
//! - `STORE` - Storage backend: "memory", "sqlite" (default) or "postgres"
//! - `SQLITE_PATH` - SQLite file (default: lexicon.db)
//! - `DATABASE_URL` - PostgreSQL connection string (or `DB_*` parts)
//! - `LLM_API_KEY` - Generative backend key (required)
//! - `RUST_LOG` / `LOG_LEVEL` - Tracing filter (default: INFO)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! # or with postgres:
//! STORE=postgres cargo run --bin server --features postgres
//! ```

use std::sync::Arc;

use anyhow::Context;
use lexicon::server::{app_router, AppState};
use lexicon::{logging, LinguisticService, OpenAiGenerator, Settings, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    logging::init(&settings);

    let storage = Storage::connect(&settings.database)
        .await
        .context("failed to open storage")?;
    let generator = OpenAiGenerator::new(&settings.llm).context("failed to build LLM client")?;
    let service = LinguisticService::from_storage(&storage, Arc::new(generator));

    let state = AppState::new(service, settings.app_env).context("failed to load templates")?;
    let app = app_router(state);

    let bind_addr = format!("0.0.0.0:{}", settings.app_port);
    tracing::info!(env = %settings.app_env, "lexicon server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health       - liveness probe");
    tracing::info!("  POST /api/analyze  - JSON analysis");
    tracing::info!("  GET  /             - analysis page");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("server failed")?;

    Ok(())
}
