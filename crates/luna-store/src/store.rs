//! The conversation store: per-identity history with bounded growth.
//!
//! Ownership rules: this store is the only component that mutates
//! `Session.turns` and `Session.summary`. Mutation is serialized per
//! session id via a per-entry async mutex; sessions with different ids
//! mutate concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use luna_core::config::ChatConfig;
use luna_core::error::{LunaError, Result};
use luna_core::types::{Role, Session, SessionSummary, StoreSnapshot, Turn, RECAP_PREFIX};
use luna_model::ChatModel;

use crate::persist::SnapshotStore;

/// System prompt used when condensing elided history.
const CONDENSE_PROMPT: &str = "Condense the following conversation excerpt into a short \
third-person recap of a few sentences. Keep names, facts, and emotional tone. \
Output only the recap text.";

/// Bounds on per-session history growth.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Summarization fires once `turns.len()` exceeds this.
    pub max_turns: usize,
    /// Most-recent turns preserved verbatim by summarization.
    pub keep_turns: usize,
}

impl StoreConfig {
    pub fn new(max_turns: usize, keep_turns: usize) -> Self {
        let max_turns = max_turns.max(2);
        // Room must remain for the recap turn itself.
        let keep_turns = keep_turns.clamp(1, max_turns - 1);
        Self {
            max_turns,
            keep_turns,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let chat = ChatConfig::default();
        Self::new(chat.max_turns, chat.keep_turns)
    }
}

impl From<&ChatConfig> for StoreConfig {
    fn from(chat: &ChatConfig) -> Self {
        Self::new(chat.max_turns, chat.keep_turns)
    }
}

/// Thread-safe store of all conversation sessions.
///
/// The session map itself is guarded by a blocking mutex held only for
/// lookups and inserts; each entry carries its own async mutex so that
/// mutation of one session serializes without blocking other sessions.
pub struct ConversationStore {
    sessions: StdMutex<HashMap<String, Arc<AsyncMutex<Session>>>>,
    config: StoreConfig,
    persister: Option<Arc<dyn SnapshotStore>>,
    /// Monotonic mutation counter; guards against an older snapshot
    /// overwriting a newer one if flushes ever race.
    generation: AtomicU64,
    flushed: AsyncMutex<u64>,
}

impl ConversationStore {
    /// Create an in-memory store with no persistence.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            config,
            persister: None,
            generation: AtomicU64::new(0),
            flushed: AsyncMutex::new(0),
        }
    }

    /// Create a store backed by a persistence adapter, hydrated from its
    /// last snapshot.
    pub fn with_persistence(config: StoreConfig, persister: Arc<dyn SnapshotStore>) -> Self {
        let store = Self {
            sessions: StdMutex::new(HashMap::new()),
            config,
            persister: Some(persister.clone()),
            generation: AtomicU64::new(0),
            flushed: AsyncMutex::new(0),
        };
        store.hydrate(persister.load());
        store
    }

    /// Replace all in-memory sessions with the snapshot's contents.
    pub fn hydrate(&self, snapshot: StoreSnapshot) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions.clear();
        for (id, session) in snapshot.sessions {
            sessions.insert(id, Arc::new(AsyncMutex::new(session)));
        }
        debug!(sessions = sessions.len(), "Store hydrated from snapshot");
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the session for `id`, creating an empty one if needed.
    /// Never fails.
    pub async fn get_or_create(&self, id: &str) -> Session {
        let entry = self.entry(id);
        let session = entry.lock().await.clone();
        session
    }

    /// Append one user turn. Rejects empty-after-trim text with
    /// `InvalidInput`; no turn is appended in that case.
    pub async fn append_user_turn(&self, id: &str, text: &str) -> Result<()> {
        self.append_turn(id, Role::User, text).await
    }

    /// Append one assistant turn. Same validation as the user side.
    pub async fn append_assistant_turn(&self, id: &str, text: &str) -> Result<()> {
        self.append_turn(id, Role::Assistant, text).await
    }

    /// Append a user turn and its assistant reply as one logical
    /// transaction: both halves are validated before either is committed,
    /// and both land under a single lock hold. Either both turns are in
    /// the session (and the subsequent snapshot) or neither is.
    pub async fn append_exchange(&self, id: &str, user_text: &str, assistant_text: &str) -> Result<()> {
        let user_text = validated(user_text)?;
        let assistant_text = validated(assistant_text)?;

        let entry = self.entry(id);
        {
            let mut session = entry.lock().await;
            session.turns.push(Turn::new(Role::User, user_text));
            session.turns.push(Turn::new(Role::Assistant, assistant_text));
            session.updated_at = Utc::now();
        }
        self.flush_after(self.bump()).await;
        Ok(())
    }

    /// True if the session currently exceeds its turn bound.
    pub async fn needs_summary(&self, id: &str) -> bool {
        let entry = self.entry(id);
        let session = entry.lock().await;
        session.turns.len() > self.config.max_turns
    }

    /// Collapse the oldest turns into a single recap turn when the session
    /// exceeds its bound.
    ///
    /// The oldest `turns.len() - keep_turns` turns are condensed through
    /// the injected model capability and replaced by one system turn
    /// prefixed with `[recap]`; the condensed text is also mirrored into
    /// `session.summary`. Condensation failure is non-fatal: the history is
    /// left untouched (never dropped without a replacement summary) and the
    /// next append retries naturally. This method never raises.
    pub async fn maybe_summarize(&self, id: &str, model: &dyn ChatModel) {
        let entry = self.entry(id);
        let mutated = {
            // Holding the session lock across the model call serializes
            // concurrent mutation of this session, keeping the elided slice
            // stable while it is condensed.
            let mut session = entry.lock().await;
            if session.turns.len() <= self.config.max_turns {
                return;
            }

            let elide_count = session.turns.len() - self.config.keep_turns;
            let elided: Vec<Turn> = session.turns[..elide_count].to_vec();
            debug!(
                session = %session.id,
                elided = elide_count,
                kept = self.config.keep_turns,
                "Summarizing session history"
            );

            match model.complete(CONDENSE_PROMPT, &elided).await {
                Ok(text) if !text.trim().is_empty() => {
                    let text = text.trim().to_string();
                    let recap = Turn::new(Role::System, format!("{} {}", RECAP_PREFIX, text));
                    let mut turns = Vec::with_capacity(self.config.keep_turns + 1);
                    turns.push(recap);
                    turns.extend_from_slice(&session.turns[elide_count..]);
                    session.turns = turns;
                    session.summary = Some(text);
                    session.updated_at = Utc::now();
                    true
                }
                Ok(_) => {
                    warn!(session = %id, "Condensation returned empty text — keeping full history");
                    false
                }
                Err(e) => {
                    warn!(session = %id, error = %e, "Condensation failed — keeping full history");
                    false
                }
            }
        };

        if mutated {
            self.flush_after(self.bump()).await;
        }
    }

    /// Serializable form of the whole store.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let entries: Vec<Arc<AsyncMutex<Session>>> = {
            let sessions = self.sessions.lock().expect("session map poisoned");
            sessions.values().cloned().collect()
        };

        let mut snapshot = StoreSnapshot::new();
        for entry in entries {
            let session = entry.lock().await.clone();
            snapshot.sessions.insert(session.id.clone(), session);
        }
        snapshot
    }

    /// Compact listing of all sessions.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let snapshot = self.snapshot().await;
        snapshot
            .sessions
            .into_values()
            .map(|s| SessionSummary {
                id: s.id,
                turn_count: s.turns.len(),
                has_summary: s.summary.is_some(),
                updated_at: s.updated_at,
            })
            .collect()
    }

    /// Turn history for one session, if it exists.
    pub async fn history(&self, id: &str) -> Option<Vec<Turn>> {
        let entry = {
            let sessions = self.sessions.lock().expect("session map poisoned");
            sessions.get(id).cloned()
        }?;
        let session = entry.lock().await;
        Some(session.turns.clone())
    }

    /// Force a flush of the current state (shutdown hook).
    pub async fn flush(&self) {
        self.flush_after(self.bump()).await;
    }

    // -- Private helpers --

    fn entry(&self, id: &str) -> Arc<AsyncMutex<Session>> {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Session::new(id))))
            .clone()
    }

    async fn append_turn(&self, id: &str, role: Role, text: &str) -> Result<()> {
        let text = validated(text)?;
        let entry = self.entry(id);
        {
            let mut session = entry.lock().await;
            session.turns.push(Turn::new(role, text));
            session.updated_at = Utc::now();
        }
        self.flush_after(self.bump()).await;
        Ok(())
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Flush the store to the persistence adapter, skipping if a newer
    /// generation has already been flushed. Write failures are logged; the
    /// in-memory state stays authoritative until the next successful flush.
    async fn flush_after(&self, generation: u64) {
        let Some(persister) = self.persister.as_ref() else {
            return;
        };

        let snapshot = self.snapshot().await;
        let mut flushed = self.flushed.lock().await;
        if generation <= *flushed {
            // A newer snapshot is already on disk.
            return;
        }
        match persister.save(&snapshot) {
            Ok(()) => *flushed = generation,
            Err(e) => warn!(error = %e, "Snapshot flush failed — in-memory state remains authoritative"),
        }
    }
}

fn validated(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LunaError::InvalidInput(
            "message is empty after trimming".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
