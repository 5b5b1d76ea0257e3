//! Application state shared across all route handlers.
//!
//! AppState holds references to the conversation core and the external
//! capabilities. It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use luna_call::CallSessionConfig;
use luna_chat::ReplyOrchestrator;
use luna_core::config::LunaConfig;
use luna_model::{SpeechSynthesizer, Transcriber};
use luna_store::ConversationStore;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<LunaConfig>,
    /// The conversation store behind the orchestrator, for read endpoints.
    pub store: Arc<ConversationStore>,
    /// Central reply coordinator used by every inbound surface.
    pub orchestrator: Arc<ReplyOrchestrator>,
    /// Speech transcription capability.
    pub transcriber: Arc<dyn Transcriber>,
    /// Speech synthesis capability.
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the given components.
    pub fn new(
        config: LunaConfig,
        store: Arc<ConversationStore>,
        orchestrator: Arc<ReplyOrchestrator>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            orchestrator,
            transcriber,
            synthesizer,
            start_time: Instant::now(),
        }
    }

    /// Streaming-session settings derived from the loaded configuration.
    pub fn call_session_config(&self) -> CallSessionConfig {
        CallSessionConfig::from_config(&self.config.call, &self.config.voice)
    }
}
