//! Luna application binary - composition root.
//!
//! Ties together all Luna crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Hydrate the conversation store from the JSON snapshot
//! 3. Wire the external capabilities (model, TTS, STT) or their mocks
//! 4. Start the axum HTTP/WebSocket server
//! 5. Flush a final snapshot on shutdown

use std::sync::Arc;

use luna_api::{create_router, AppState};
use luna_chat::{OrchestratorConfig, ReplyOrchestrator};
use luna_core::config::LunaConfig;
use luna_model::{
    ChatModel, MockChatModel, MockSynthesizer, MockTranscriber, OpenAiBackend, SpeechSynthesizer,
    Transcriber,
};
use luna_store::{ConversationStore, JsonSnapshotFile, StoreConfig};

mod cli;

use clap::Parser;
use cli::CliArgs;

/// The three external capabilities, wired together.
struct Capabilities {
    model: Arc<dyn ChatModel>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Pick the real backend when an API key is configured, mocks otherwise.
///
/// The mock fallback keeps the whole service usable for local development
/// and tests without network access or credentials.
fn build_capabilities(config: &LunaConfig) -> Result<Capabilities, Box<dyn std::error::Error>> {
    let api_key = std::env::var(&config.model.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());

    match api_key {
        Some(key) => {
            let backend = Arc::new(OpenAiBackend::new(
                &config.model,
                key,
                config.voice.tts_model.clone(),
                config.voice.stt_model.clone(),
            )?);
            tracing::info!(
                api_base = %config.model.api_base,
                chat_model = %config.model.chat_model,
                "Using OpenAI-compatible backend"
            );
            Ok(Capabilities {
                model: backend.clone(),
                transcriber: backend.clone(),
                synthesizer: backend,
            })
        }
        None => {
            tracing::warn!(
                env = %config.model.api_key_env,
                "API key not set, falling back to mock model/voice backends"
            );
            Ok(Capabilities {
                model: Arc::new(MockChatModel::new()),
                transcriber: Arc::new(MockTranscriber::default()),
                synthesizer: Arc::new(MockSynthesizer::new()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first so the log level can come from it.
    let config_file = args.resolve_config_path();
    let mut config = LunaConfig::load_or_default(&config_file);
    config.server.port = args.resolve_port(config.server.port);

    // Tracing. RUST_LOG wins over config/CLI when set.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    tracing::info!("Starting Luna v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Persistence.
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let snapshot_path = data_dir.join(&config.storage.snapshot_file);
    let persister = Arc::new(JsonSnapshotFile::new(snapshot_path.clone()));

    // Conversation store, hydrated from the last snapshot.
    let store = Arc::new(ConversationStore::with_persistence(
        StoreConfig::new(config.chat.max_turns, config.chat.keep_turns),
        persister,
    ));
    tracing::info!(
        path = %snapshot_path.display(),
        sessions = store.len(),
        "Conversation store ready"
    );

    // External capabilities.
    let caps = build_capabilities(&config)?;

    // Orchestrator shared by every inbound surface.
    let orchestrator = Arc::new(ReplyOrchestrator::new(
        store.clone(),
        caps.model,
        OrchestratorConfig::from_config(&config.chat, &config.model),
    ));

    // HTTP/WebSocket server.
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(
        config,
        store.clone(),
        orchestrator,
        caps.transcriber,
        caps.synthesizer,
    );
    let router = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind — is another instance running?");
            return Err(e.into());
        }
    };
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // One last snapshot so nothing committed in memory is lost.
    store.flush().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    } else {
        tracing::info!("Shutdown signal received");
    }
}
