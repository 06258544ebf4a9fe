//! Main Entrypoint for the Debate API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Opening the SQLite session store and running migrations.
//! 3. Building the structured-output client and the debate agents.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Serving until `Ctrl+C`, then letting in-flight debate turns finish.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use debate_api::{config::Config, db::Db, router::create_router, state::AppState};
use debate_core::{
    SessionRegistry,
    agents::{DebateAgents, DebatePrompts},
    llm_client::OpenAICompatibleClient,
};
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = ?e, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads the `*.md` prompt overrides of a directory, keyed by file stem.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Cannot read prompts directory {}", prompts_path.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let db = Db::connect(&config.database_url, 5)
        .await
        .context("Failed to connect to database")?;
    db.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize Debate Agents ---
    let mut prompts = DebatePrompts::default();
    if let Some(prompts_path) = &config.prompts_path {
        let overrides = load_prompts(prompts_path)?;
        info!(count = overrides.len(), path = %prompts_path.display(), "Loaded prompt overrides.");
        prompts = prompts.with_overrides(overrides);
    }

    let api_key = config
        .api_key()
        .context("No API key configured for the selected provider")?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());
    let client = OpenAICompatibleClient::new(openai_config, config.chat_model.clone())
        .with_temperature(config.chat_temperature);

    let sessions = Arc::new(SessionRegistry::new(
        Arc::new(db),
        DebateAgents::new(Arc::new(client), prompts),
    ));
    let app_state = Arc::new(AppState {
        sessions: sessions.clone(),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sessions.shutdown().await;
    info!("Server has shut down.");
    Ok(())
}
