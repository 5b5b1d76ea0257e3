use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LunaError, Result};

/// Top-level configuration for the Luna service.
///
/// Loaded from `~/.luna/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LunaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub call: CallConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl LunaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LunaConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| LunaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the conversation snapshot and scratch files.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.luna/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Conversation and context-window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Persona/style preamble sent ahead of every context window.
    pub persona: String,
    /// Maximum turns a session may hold before summarization fires.
    pub max_turns: usize,
    /// Recent turns preserved verbatim when older history is condensed.
    pub keep_turns: usize,
    /// Maximum message length in characters.
    pub max_message_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persona: "You are Luna, a warm and attentive companion. \
                      Reply briefly and conversationally."
                .to_string(),
            max_turns: 24,
            keep_turns: 12,
            max_message_chars: 2000,
        }
    }
}

/// External language-model backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Chat completion model id.
    pub chat_model: String,
    /// Upper bound on any single upstream call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Speech synthesis and transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether replies may carry synthesized audio.
    pub enabled: bool,
    /// TTS voice name.
    pub voice: String,
    /// TTS model id.
    pub tts_model: String,
    /// STT model id.
    pub stt_model: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: "alloy".to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            stt_model: "whisper-1".to_string(),
        }
    }
}

/// What the finalize path does when a segment transcribes to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTranscriptPolicy {
    /// Route a placeholder input through the model for a generic reply.
    InvokeModel,
    /// Short-circuit with a canned apology; no model call, no history.
    Apologize,
}

/// Live-call streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Minimum gap between partial-transcription attempts, in milliseconds.
    pub partial_interval_ms: u64,
    /// Cap on the unfinalized audio buffer for one segment, in bytes.
    pub max_buffer_bytes: usize,
    /// Behavior when a finalized segment transcribes to empty text.
    pub empty_transcript_policy: EmptyTranscriptPolicy,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            partial_interval_ms: 1400,
            max_buffer_bytes: 16 * 1024 * 1024,
            empty_transcript_policy: EmptyTranscriptPolicy::InvokeModel,
        }
    }
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File name of the JSON snapshot inside `general.data_dir`.
    pub snapshot_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_file: "sessions.json".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}
