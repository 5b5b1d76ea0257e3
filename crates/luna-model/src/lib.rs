//! External capability traits for Luna: language model, speech synthesis,
//! and speech transcription.
//!
//! Provides trait-based abstractions over the paid external services, along
//! with mock implementations for testing and development without network
//! access. The real backend lives in [`openai`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use luna_core::error::LunaError;
use luna_core::types::Turn;

pub mod openai;

pub use openai::OpenAiBackend;

// =============================================================================
// Traits
// =============================================================================

/// Language-model completion capability.
///
/// One invocation makes exactly one upstream call; callers decide whether a
/// failed call is retried. Failures surface as `LunaError::Upstream`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce a completion for the given system prompt and context turns.
    async fn complete(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, LunaError>;
}

/// Speech synthesis capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize speech audio for `text` using the named voice.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, LunaError>;
}

/// Speech transcription capability.
///
/// May return empty text for inaudible input; that is not itself an error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe encoded audio bytes into text.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, LunaError>;
}

// =============================================================================
// Mock implementations
// =============================================================================

/// Mock language model for testing and offline development.
///
/// Replies can be scripted with [`MockChatModel::push_reply`]; without a
/// script it echoes the last turn. A failure flag turns every call into an
/// `Upstream` error.
#[derive(Debug, Default)]
pub struct MockChatModel {
    replies: Mutex<VecDeque<String>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted reply, consumed in FIFO order.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().expect("replies mutex poisoned").push_back(reply.into());
    }

    /// Make every subsequent call fail with `Upstream`.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `complete` invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, _system_prompt: &str, turns: &[Turn]) -> Result<String, LunaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(LunaError::Upstream("mock model failure".to_string()));
        }

        if let Some(reply) = self.replies.lock().expect("replies mutex poisoned").pop_front() {
            return Ok(reply);
        }

        let echo = turns
            .last()
            .map(|t| format!("You said: {}", t.content))
            .unwrap_or_else(|| "Hello!".to_string());
        Ok(echo)
    }
}

/// One scripted step for [`MockTranscriber`].
#[derive(Debug, Clone)]
pub struct TranscribeStep {
    /// Text to return (may be empty — inaudible input).
    pub text: String,
    /// Artificial latency before the result, for ordering tests.
    pub delay: Duration,
    /// Whether this step fails with `Upstream` instead.
    pub fail: bool,
}

impl TranscribeStep {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn delayed(text: impl Into<String>, delay: Duration) -> Self {
        Self {
            text: text.into(),
            delay,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            text: String::new(),
            delay: Duration::ZERO,
            fail: true,
        }
    }
}

/// Mock transcription service.
///
/// Consumes scripted steps in FIFO order; once the script is exhausted it
/// returns `default_text`. Used heavily by the streaming-session tests to
/// exercise ordering and failure paths.
#[derive(Debug)]
pub struct MockTranscriber {
    script: Mutex<VecDeque<TranscribeStep>>,
    default_text: String,
    calls: AtomicUsize,
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new("mock transcript")
    }
}

impl MockTranscriber {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_text: default_text.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_step(&self, step: TranscribeStep) {
        self.script.lock().expect("script mutex poisoned").push_back(step);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, LunaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if audio.is_empty() {
            return Ok(String::new());
        }

        let step = self.script.lock().expect("script mutex poisoned").pop_front();
        match step {
            Some(step) => {
                if !step.delay.is_zero() {
                    tokio::time::sleep(step.delay).await;
                }
                if step.fail {
                    Err(LunaError::Upstream("mock transcription failure".to_string()))
                } else {
                    Ok(step.text)
                }
            }
            None => Ok(self.default_text.clone()),
        }
    }
}

/// Mock speech synthesizer returning a recognizable byte payload.
#[derive(Debug, Default)]
pub struct MockSynthesizer {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, LunaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(LunaError::Upstream("mock synthesis failure".to_string()));
        }
        if text.trim().is_empty() {
            return Err(LunaError::Upstream("nothing to synthesize".to_string()));
        }

        let mut bytes = format!("MOCKAUDIO:{}:", voice).into_bytes();
        bytes.extend_from_slice(text.as_bytes());
        Ok(bytes)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use luna_core::types::Role;

    #[tokio::test]
    async fn test_mock_model_echoes_last_turn() {
        let model = MockChatModel::new();
        let turns = vec![Turn::new(Role::User, "hi there")];
        let reply = model.complete("persona", &turns).await.unwrap();
        assert_eq!(reply, "You said: hi there");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_model_scripted_replies_in_order() {
        let model = MockChatModel::new();
        model.push_reply("first");
        model.push_reply("second");
        let turns = vec![Turn::new(Role::User, "x")];
        assert_eq!(model.complete("p", &turns).await.unwrap(), "first");
        assert_eq!(model.complete("p", &turns).await.unwrap(), "second");
        // Script exhausted — falls back to echo.
        assert_eq!(model.complete("p", &turns).await.unwrap(), "You said: x");
    }

    #[tokio::test]
    async fn test_mock_model_empty_context() {
        let model = MockChatModel::new();
        let reply = model.complete("persona", &[]).await.unwrap();
        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn test_mock_model_failure_flag() {
        let model = MockChatModel::new();
        model.set_fail(true);
        let result = model.complete("p", &[]).await;
        assert!(matches!(result, Err(LunaError::Upstream(_))));

        model.set_fail(false);
        assert!(model.complete("p", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_transcriber_empty_audio_is_empty_text() {
        let t = MockTranscriber::default();
        let text = t.transcribe(&[]).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_mock_transcriber_default_text() {
        let t = MockTranscriber::new("hello world");
        let text = t.transcribe(&[1, 2, 3]).await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_mock_transcriber_scripted_steps() {
        let t = MockTranscriber::default();
        t.push_step(TranscribeStep::ok("one"));
        t.push_step(TranscribeStep::failing());
        t.push_step(TranscribeStep::ok(""));

        assert_eq!(t.transcribe(&[0]).await.unwrap(), "one");
        assert!(t.transcribe(&[0]).await.is_err());
        // Empty text is a valid result, not an error.
        assert_eq!(t.transcribe(&[0]).await.unwrap(), "");
        assert_eq!(t.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_transcriber_delay_step() {
        let t = MockTranscriber::default();
        t.push_step(TranscribeStep::delayed("slow", Duration::from_millis(20)));
        let started = std::time::Instant::now();
        assert_eq!(t.transcribe(&[0]).await.unwrap(), "slow");
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_mock_synthesizer_produces_bytes() {
        let s = MockSynthesizer::new();
        let audio = s.synthesize("hello", "alloy").await.unwrap();
        assert!(audio.starts_with(b"MOCKAUDIO:alloy:"));
    }

    #[tokio::test]
    async fn test_mock_synthesizer_rejects_empty_text() {
        let s = MockSynthesizer::new();
        assert!(s.synthesize("   ", "alloy").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_synthesizer_failure_flag() {
        let s = MockSynthesizer::new();
        s.set_fail(true);
        assert!(s.synthesize("hello", "alloy").await.is_err());
    }

    #[tokio::test]
    async fn test_traits_are_object_safe() {
        let model: std::sync::Arc<dyn ChatModel> = std::sync::Arc::new(MockChatModel::new());
        let transcriber: std::sync::Arc<dyn Transcriber> =
            std::sync::Arc::new(MockTranscriber::default());
        let synth: std::sync::Arc<dyn SpeechSynthesizer> =
            std::sync::Arc::new(MockSynthesizer::new());

        assert!(model.complete("p", &[]).await.is_ok());
        assert!(transcriber.transcribe(&[1]).await.is_ok());
        assert!(synth.synthesize("hi", "alloy").await.is_ok());
    }
}
