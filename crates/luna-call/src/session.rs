//! Per-connection streaming session task.
//!
//! The session runs as a single task consuming a command channel, which gives
//! the ordering guarantees for free: at most one finalize is in flight per
//! connection, a second segment boundary queues behind it, and segment N's
//! result is always emitted before segment N+1's. Partial transcriptions are
//! the one exception — they run in spawned tasks over a copy of the buffer
//! and are advisory only, so their failures are swallowed and their ordering
//! is best-effort.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use luna_core::config::{CallConfig, EmptyTranscriptPolicy, VoiceConfig};
use luna_core::error::LunaError;
use luna_chat::{ChatReply, Mood, ReplyOrchestrator};
use luna_model::{SpeechSynthesizer, Transcriber};

use crate::state::{CallState, CallStateMachine};

/// Input the model receives when the empty-transcript policy routes an
/// inaudible segment through it anyway.
const INAUDIBLE_PLACEHOLDER: &str = "[inaudible]";

/// Canned reply for the short-circuit policy. Nothing is committed to the
/// conversation in that case.
const APOLOGY_REPLY: &str = "Sorry, I couldn't make that out. Could you say it again?";

/// Settings for one streaming session, derived from the call and voice
/// config sections.
#[derive(Debug, Clone)]
pub struct CallSessionConfig {
    /// TTS voice for reply audio.
    pub voice: String,
    /// Whether reply audio is synthesized at all.
    pub voice_enabled: bool,
    /// Minimum gap between partial-transcription attempts.
    pub partial_interval: Duration,
    /// Cap on the unfinalized buffer for one segment.
    pub max_buffer_bytes: usize,
    /// Behavior when a finalized segment transcribes to empty text.
    pub empty_transcript_policy: EmptyTranscriptPolicy,
}

impl CallSessionConfig {
    pub fn from_config(call: &CallConfig, voice: &VoiceConfig) -> Self {
        Self {
            voice: voice.voice.clone(),
            voice_enabled: voice.enabled,
            partial_interval: Duration::from_millis(call.partial_interval_ms),
            max_buffer_bytes: call.max_buffer_bytes,
            empty_transcript_policy: call.empty_transcript_policy,
        }
    }
}

impl Default for CallSessionConfig {
    fn default() -> Self {
        Self::from_config(&CallConfig::default(), &VoiceConfig::default())
    }
}

/// Inbound control messages for a session task.
#[derive(Debug)]
pub enum CallCommand {
    /// One binary audio frame for the current segment.
    Audio(Vec<u8>),
    /// Explicit segment boundary: finalize the buffered audio.
    SegmentEnd,
    /// Connection closed: discard any unfinalized buffer and stop.
    Close,
}

/// The authoritative outcome of one finalized segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentResult {
    /// 1-based segment counter within this connection.
    pub segment: u64,
    /// Full transcript of the segment (may be empty for inaudible audio).
    pub transcript: String,
    /// Assistant reply text.
    pub reply: String,
    /// Advisory mood derived from the transcript.
    pub mood: Mood,
    /// Synthesized reply audio; `None` when synthesis is disabled or failed.
    pub audio: Option<Vec<u8>>,
}

/// Outbound events emitted by a session task.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// Advisory low-latency transcript of the buffer-so-far. No ordering
    /// guarantee beyond best-effort recency; never authoritative.
    Partial { text: String },
    /// Strictly-ordered per-segment outcome.
    Result(SegmentResult),
    /// A finalize attempt failed; the segment's audio has been discarded and
    /// the session keeps accepting the next segment.
    Error { segment: u64, message: String },
}

/// Caller-side handle for a spawned session task.
///
/// Dropping the handle closes the command channel, which the task treats the
/// same as an explicit `Close`.
#[derive(Debug, Clone)]
pub struct CallHandle {
    commands: mpsc::Sender<CallCommand>,
    state: CallStateMachine,
}

impl CallHandle {
    pub async fn audio(&self, frame: Vec<u8>) -> Result<(), LunaError> {
        self.send(CallCommand::Audio(frame)).await
    }

    pub async fn segment_end(&self) -> Result<(), LunaError> {
        self.send(CallCommand::SegmentEnd).await
    }

    pub async fn close(&self) -> Result<(), LunaError> {
        self.send(CallCommand::Close).await
    }

    /// Current lifecycle state of the session task.
    pub fn state(&self) -> CallState {
        self.state.current()
    }

    async fn send(&self, command: CallCommand) -> Result<(), LunaError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LunaError::Call("session task is gone".to_string()))
    }
}

/// One live streaming session bound to a conversation.
pub struct CallSession {
    /// Unique id for this connection, for log correlation. Distinct from
    /// the conversational `session_id`, which survives reconnects.
    connection: Uuid,
    session_id: String,
    orchestrator: Arc<ReplyOrchestrator>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: CallSessionConfig,
    state: CallStateMachine,
    events: mpsc::Sender<CallEvent>,
    buffer: Vec<u8>,
    last_partial_at: Instant,
    segment: u64,
}

impl CallSession {
    /// Spawn a session task for one connection.
    ///
    /// Returns the command-side handle and the event stream. The task ends
    /// when it receives `Close` or the command channel closes.
    pub fn spawn(
        session_id: impl Into<String>,
        orchestrator: Arc<ReplyOrchestrator>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: CallSessionConfig,
    ) -> (CallHandle, mpsc::Receiver<CallEvent>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(32);

        let state = CallStateMachine::new();
        let session = CallSession {
            connection: Uuid::new_v4(),
            session_id: session_id.into(),
            orchestrator,
            transcriber,
            synthesizer,
            config,
            state: state.clone(),
            events: event_tx,
            buffer: Vec::new(),
            last_partial_at: Instant::now(),
            segment: 0,
        };

        info!(
            connection = %session.connection,
            session = %session.session_id,
            "Call session opened"
        );
        tokio::spawn(session.run(command_rx));

        (
            CallHandle {
                commands: command_tx,
                state,
            },
            event_rx,
        )
    }

    async fn run(mut self, mut commands: mpsc::Receiver<CallCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                CallCommand::Audio(frame) => self.on_audio(frame),
                CallCommand::SegmentEnd => self.finalize().await,
                CallCommand::Close => break,
            }
        }

        // Unfinalized audio is discarded on close, never transcribed.
        let discarded = self.buffer.len();
        self.buffer = Vec::new();
        if self.state.transition(CallState::Closed).is_ok() {
            info!(
                connection = %self.connection,
                session = %self.session_id,
                discarded_bytes = discarded,
                segments = self.segment,
                "Call session closed"
            );
        }
    }

    fn on_audio(&mut self, frame: Vec<u8>) {
        if self.buffer.len() + frame.len() > self.config.max_buffer_bytes {
            warn!(
                session = %self.session_id,
                buffered = self.buffer.len(),
                frame = frame.len(),
                "Segment buffer cap reached, dropping frame"
            );
            return;
        }
        self.buffer.extend_from_slice(&frame);

        if self.last_partial_at.elapsed() >= self.config.partial_interval && !self.buffer.is_empty()
        {
            self.last_partial_at = Instant::now();
            self.spawn_partial();
        }
    }

    /// Attempt an advisory partial transcription of the buffer-so-far in a
    /// detached task. The copy of the buffer drops when the task finishes,
    /// success or not, and failures never reach the connection.
    fn spawn_partial(&self) {
        let audio = self.buffer.clone();
        let transcriber = Arc::clone(&self.transcriber);
        let events = self.events.clone();
        let session_id = self.session_id.clone();

        tokio::spawn(async move {
            match transcriber.transcribe(&audio).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        let _ = events.send(CallEvent::Partial { text }).await;
                    }
                }
                Err(e) => {
                    debug!(session = %session_id, error = %e, "Partial transcription failed");
                }
            }
        });
    }

    /// Finalize the current segment: transcribe the complete buffer, route
    /// the transcript through the orchestrator, synthesize the reply, and
    /// emit one `Result` event. The buffer is taken up front so the audio is
    /// released on every path, including errors.
    async fn finalize(&mut self) {
        if self.state.transition(CallState::Finalizing).is_err() {
            return;
        }
        self.segment += 1;
        let segment = self.segment;
        let audio = mem::take(&mut self.buffer);
        self.last_partial_at = Instant::now();

        debug!(
            session = %self.session_id,
            segment,
            bytes = audio.len(),
            "Finalizing segment"
        );

        let transcript = if audio.is_empty() {
            String::new()
        } else {
            match self.transcriber.transcribe(&audio).await {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!(session = %self.session_id, segment, error = %e, "Segment transcription failed");
                    self.emit(CallEvent::Error {
                        segment,
                        message: e.to_string(),
                    })
                    .await;
                    let _ = self.state.transition(CallState::Accumulating);
                    return;
                }
            }
        };
        drop(audio);

        let reply = self.reply_for(&transcript).await;
        match reply {
            Ok(reply) => {
                let audio = self.synthesize_reply(&reply.text).await;
                self.emit(CallEvent::Result(SegmentResult {
                    segment,
                    transcript,
                    reply: reply.text,
                    mood: reply.mood,
                    audio,
                }))
                .await;
            }
            Err(e) => {
                warn!(session = %self.session_id, segment, error = %e, "Segment reply failed");
                self.emit(CallEvent::Error {
                    segment,
                    message: e.to_string(),
                })
                .await;
            }
        }

        let _ = self.state.transition(CallState::Accumulating);
    }

    async fn reply_for(&self, transcript: &str) -> Result<ChatReply, LunaError> {
        if transcript.is_empty() {
            match self.config.empty_transcript_policy {
                EmptyTranscriptPolicy::InvokeModel => self
                    .orchestrator
                    .reply(&self.session_id, INAUDIBLE_PLACEHOLDER)
                    .await
                    .map_err(|e| LunaError::Call(e.to_string())),
                EmptyTranscriptPolicy::Apologize => Ok(ChatReply {
                    text: APOLOGY_REPLY.to_string(),
                    mood: Mood::Neutral,
                }),
            }
        } else {
            self.orchestrator
                .reply(&self.session_id, transcript)
                .await
                .map_err(|e| LunaError::Call(e.to_string()))
        }
    }

    /// Best-effort reply audio. Synthesis failures are advisory: the text
    /// result still goes out, just without audio.
    async fn synthesize_reply(&self, text: &str) -> Option<Vec<u8>> {
        if !self.config.voice_enabled {
            return None;
        }
        match self.synthesizer.synthesize(text, &self.config.voice).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(session = %self.session_id, error = %e, "Reply synthesis failed");
                None
            }
        }
    }

    async fn emit(&self, event: CallEvent) {
        // A receiver that went away mid-finalize aborts delivery only; the
        // buffer and state cleanup above already happened.
        if self.events.send(event).await.is_err() {
            debug!(session = %self.session_id, "Event receiver gone, dropping event");
        }
    }
}
