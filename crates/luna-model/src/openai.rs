//! OpenAI-compatible HTTP backend for all three external capabilities.
//!
//! Talks to `/chat/completions`, `/audio/speech`, and `/audio/transcriptions`
//! on any OpenAI-compatible API base. Every request is bounded by the
//! configured timeout; timeouts and non-success statuses surface as
//! `LunaError::Upstream` so callers can treat a retry as safe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use luna_core::config::ModelConfig;
use luna_core::error::LunaError;
use luna_core::types::Turn;

use crate::{ChatModel, SpeechSynthesizer, Transcriber};

/// HTTP client for an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_base: String,
    api_key: String,
    chat_model: String,
    tts_model: String,
    stt_model: String,
}

impl OpenAiBackend {
    /// Build a backend from model config plus the resolved API key.
    ///
    /// # Errors
    /// Returns `LunaError::Config` if the HTTP client cannot be constructed.
    pub fn new(
        config: &ModelConfig,
        api_key: String,
        tts_model: String,
        stt_model: String,
    ) -> Result<Self, LunaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LunaError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            tts_model,
            stt_model,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn upstream(context: &str, err: reqwest::Error) -> LunaError {
        if err.is_timeout() {
            LunaError::Upstream(format!("{} timed out", context))
        } else {
            LunaError::Upstream(format!("{} failed: {}", context, err))
        }
    }

    async fn check_status(
        context: &str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, LunaError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(LunaError::Upstream(format!(
            "{} returned {}: {}",
            context,
            status,
            body.chars().take(200).collect::<String>()
        )))
    }
}

#[async_trait]
impl ChatModel for OpenAiBackend {
    async fn complete(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, LunaError> {
        let mut messages = vec![json!({"role": "system", "content": system_prompt})];
        for turn in turns {
            messages.push(json!({"role": turn.role.to_string(), "content": turn.content}));
        }

        let body = json!({
            "model": self.chat_model,
            "messages": messages,
        });

        let resp = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::upstream("chat completion", e))?;
        let resp = Self::check_status("chat completion", resp).await?;

        let resp_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Self::upstream("chat completion decode", e))?;

        let text = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LunaError::Upstream("chat completion response missing content".to_string())
            })?;

        tracing::debug!(reply_len = text.len(), "Chat completion received");
        Ok(text.to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiBackend {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, LunaError> {
        let body = json!({
            "model": self.tts_model,
            "voice": voice,
            "input": text,
        });

        let resp = self
            .client
            .post(self.url("/audio/speech"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::upstream("speech synthesis", e))?;
        let resp = Self::check_status("speech synthesis", resp).await?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::upstream("speech synthesis read", e))?;

        tracing::debug!(audio_bytes = bytes.len(), voice = %voice, "Speech synthesized");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Transcriber for OpenAiBackend {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, LunaError> {
        if audio.is_empty() {
            // Inaudible/empty input is not an upstream error.
            return Ok(String::new());
        }

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("segment.wav")
            .mime_str("audio/wav")
            .map_err(|e| LunaError::Upstream(format!("transcription part: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.stt_model.clone())
            .part("file", part);

        let resp = self
            .client
            .post(self.url("/audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::upstream("transcription", e))?;
        let resp = Self::check_status("transcription", resp).await?;

        let resp_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Self::upstream("transcription decode", e))?;

        // Whisper-style responses carry the text at the top level; empty
        // text for inaudible audio is a valid result.
        let text = resp_json["text"].as_str().unwrap_or_default().to_string();
        tracing::debug!(text_len = text.len(), "Transcription received");
        Ok(text)
    }
}
