//! Reply orchestrator: one user input in, one assistant reply out.
//!
//! Builds a bounded context window, makes exactly one model call per
//! invocation (no automatic retry — that risks double-billing a paid API
//! and duplicate turns), and commits both turns atomically on success.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use luna_core::config::{ChatConfig, ModelConfig};
use luna_core::types::{Role, Turn};
use luna_model::ChatModel;
use luna_store::ConversationStore;

use crate::error::ChatError;
use crate::sentiment::{mood_of, Mood};

/// Orchestrator settings, derived from the chat and model config sections.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Immutable persona/style preamble.
    pub persona: String,
    /// Maximum live turns included in the outbound context window. Matches
    /// the bound the store enforces.
    pub max_context_turns: usize,
    /// Maximum input length in characters.
    pub max_message_chars: usize,
    /// Upper bound on the model call.
    pub request_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn from_config(chat: &ChatConfig, model: &ModelConfig) -> Self {
        Self {
            persona: chat.persona.clone(),
            max_context_turns: chat.max_turns,
            max_message_chars: chat.max_message_chars,
            request_timeout: Duration::from_secs(model.request_timeout_secs),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default(), &ModelConfig::default())
    }
}

/// One assistant reply plus the advisory mood derived from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub mood: Mood,
}

/// Central coordinator turning user input into assistant replies.
pub struct ReplyOrchestrator {
    store: Arc<ConversationStore>,
    model: Arc<dyn ChatModel>,
    config: OrchestratorConfig,
}

impl ReplyOrchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        model: Arc<dyn ChatModel>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            model,
            config,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Produce one assistant reply for `input` in the context of
    /// `session_id`.
    ///
    /// On success both turns are committed to the store as one transaction
    /// and summarization has been given a chance to run. On any error no
    /// turn is committed, so the caller may retry when
    /// [`ChatError::retry_safe`] says so.
    pub async fn reply(&self, session_id: &str, input: &str) -> Result<ChatReply, ChatError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if input.chars().count() > self.config.max_message_chars {
            return Err(ChatError::MessageTooLong(self.config.max_message_chars));
        }

        let session = self.store.get_or_create(session_id).await;

        // Context window: the live turns (the recap system turn, when one
        // exists, already leads them) plus the not-yet-committed input.
        let window_start = session
            .turns
            .len()
            .saturating_sub(self.config.max_context_turns);
        let mut context: Vec<Turn> = session.turns[window_start..].to_vec();
        context.push(Turn::new(Role::User, input));

        debug!(
            session = %session_id,
            context_turns = context.len(),
            "Requesting completion"
        );

        let reply_text = match tokio::time::timeout(
            self.config.request_timeout,
            self.model.complete(&self.config.persona, &context),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ChatError::Upstream("model call timed out".to_string())),
        };

        // Single logical transaction: either both turns land or neither.
        self.store
            .append_exchange(session_id, input, &reply_text)
            .await?;

        // Bounding runs after every successful append; condensation
        // failures are swallowed inside the store.
        self.store
            .maybe_summarize(session_id, self.model.as_ref())
            .await;

        Ok(ChatReply {
            text: reply_text.trim().to_string(),
            mood: mood_of(input),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use luna_core::error::LunaError;
    use luna_model::MockChatModel;
    use luna_store::StoreConfig;
    use std::sync::Mutex;

    fn orchestrator_with(
        store_config: StoreConfig,
        model: Arc<dyn ChatModel>,
    ) -> ReplyOrchestrator {
        let store = Arc::new(ConversationStore::new(store_config));
        let config = OrchestratorConfig {
            persona: "You are Luna.".to_string(),
            max_context_turns: store_config.max_turns,
            max_message_chars: 2000,
            request_timeout: Duration::from_secs(5),
        };
        ReplyOrchestrator::new(store, model, config)
    }

    fn default_orchestrator() -> (ReplyOrchestrator, Arc<MockChatModel>) {
        let model = Arc::new(MockChatModel::new());
        let orch = orchestrator_with(StoreConfig::new(24, 12), model.clone());
        (orch, model)
    }

    #[tokio::test]
    async fn test_reply_round_trip() {
        let (orch, model) = default_orchestrator();
        model.push_reply("hello there");

        let reply = orch.reply("web:u1", "hi").await.unwrap();
        assert_eq!(reply.text, "hello there");
        assert_eq!(reply.mood, Mood::Neutral);

        let history = orch.store().history("web:u1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "hello there");
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (orch, model) = default_orchestrator();
        assert!(matches!(
            orch.reply("web:u1", "").await,
            Err(ChatError::EmptyMessage)
        ));
        assert!(matches!(
            orch.reply("web:u1", "  \n ").await,
            Err(ChatError::EmptyMessage)
        ));
        // The model was never consulted.
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_too_long_input_rejected() {
        let (orch, model) = default_orchestrator();
        let long = "a".repeat(2001);
        assert!(matches!(
            orch.reply("web:u1", &long).await,
            Err(ChatError::MessageTooLong(2000))
        ));
        assert_eq!(model.call_count(), 0);

        let at_limit = "a".repeat(2000);
        assert!(orch.reply("web:u1", &at_limit).await.is_ok());
    }

    #[tokio::test]
    async fn test_upstream_failure_commits_nothing() {
        let (orch, model) = default_orchestrator();
        model.set_fail(true);

        let result = orch.reply("web:u1", "hi").await;
        assert!(matches!(result, Err(ChatError::Upstream(_))));
        assert!(result.unwrap_err().retry_safe());

        // No orphaned half-turn.
        let session = orch.store().get_or_create("web:u1").await;
        assert!(session.turns.is_empty());
    }

    #[tokio::test]
    async fn test_no_automatic_retry_on_failure() {
        let (orch, model) = default_orchestrator();
        model.set_fail(true);
        let _ = orch.reply("web:u1", "hi").await;
        // Exactly one upstream attempt per invocation.
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_model_sees_prior_turns_and_new_input() {
        struct Capturing {
            contexts: Mutex<Vec<Vec<Turn>>>,
        }

        #[async_trait]
        impl ChatModel for Capturing {
            async fn complete(
                &self,
                _system_prompt: &str,
                turns: &[Turn],
            ) -> Result<String, LunaError> {
                self.contexts.lock().unwrap().push(turns.to_vec());
                Ok("ok".to_string())
            }
        }

        let model = Arc::new(Capturing {
            contexts: Mutex::new(Vec::new()),
        });
        let orch = orchestrator_with(StoreConfig::new(24, 12), model.clone());

        orch.reply("web:u1", "first").await.unwrap();
        orch.reply("web:u1", "second").await.unwrap();

        let contexts = model.contexts.lock().unwrap();
        // First call: just the new input.
        assert_eq!(contexts[0].len(), 1);
        assert_eq!(contexts[0][0].content, "first");
        // Second call: the committed exchange plus the new input, in order.
        assert_eq!(contexts[1].len(), 3);
        assert_eq!(contexts[1][0].content, "first");
        assert_eq!(contexts[1][1].content, "ok");
        assert_eq!(contexts[1][2].content, "second");
    }

    #[tokio::test]
    async fn test_context_window_is_bounded() {
        struct Counting {
            max_seen: Mutex<usize>,
        }

        #[async_trait]
        impl ChatModel for Counting {
            async fn complete(
                &self,
                _system_prompt: &str,
                turns: &[Turn],
            ) -> Result<String, LunaError> {
                let mut max = self.max_seen.lock().unwrap();
                *max = (*max).max(turns.len());
                Ok("ok".to_string())
            }
        }

        let model = Arc::new(Counting {
            max_seen: Mutex::new(0),
        });
        // A store bound large enough that summarization never fires, with a
        // small context window.
        let store = Arc::new(ConversationStore::new(StoreConfig::new(100, 50)));
        let config = OrchestratorConfig {
            persona: "p".to_string(),
            max_context_turns: 4,
            max_message_chars: 2000,
            request_timeout: Duration::from_secs(5),
        };
        let orch = ReplyOrchestrator::new(store, model.clone(), config);

        for i in 0..10 {
            orch.reply("web:u1", &format!("m{}", i)).await.unwrap();
        }

        // Window of 4 live turns plus the new input.
        assert!(*model.max_seen.lock().unwrap() <= 5);
    }

    #[tokio::test]
    async fn test_summarization_fires_after_bound() {
        let model = Arc::new(MockChatModel::new());
        let orch = orchestrator_with(StoreConfig::new(4, 2), model.clone());

        // Three exchanges = 6 turns > 4; the third reply triggers
        // summarization.
        for reply in ["r1", "r2", "r3"] {
            model.push_reply(reply);
        }
        model.push_reply("they talked");

        orch.reply("web:u1", "one").await.unwrap();
        orch.reply("web:u1", "two").await.unwrap();
        orch.reply("web:u1", "three").await.unwrap();

        let session = orch.store().get_or_create("web:u1").await;
        assert!(session.turns.len() <= 4);
        assert!(session.turns[0].is_recap());
        assert!(session.summary.is_some());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_upstream() {
        struct Slow;

        #[async_trait]
        impl ChatModel for Slow {
            async fn complete(
                &self,
                _system_prompt: &str,
                _turns: &[Turn],
            ) -> Result<String, LunaError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".to_string())
            }
        }

        let store = Arc::new(ConversationStore::new(StoreConfig::new(24, 12)));
        let config = OrchestratorConfig {
            persona: "p".to_string(),
            max_context_turns: 24,
            max_message_chars: 2000,
            request_timeout: Duration::from_millis(20),
        };
        let orch = ReplyOrchestrator::new(store, Arc::new(Slow), config);

        let result = orch.reply("web:u1", "hi").await;
        assert!(matches!(result, Err(ChatError::Upstream(_))));
        // Timed-out call commits nothing.
        let session = orch.store().get_or_create("web:u1").await;
        assert!(session.turns.is_empty());
    }

    #[tokio::test]
    async fn test_mood_follows_input_sentiment() {
        let (orch, model) = default_orchestrator();
        model.push_reply("aw");
        model.push_reply("yay");

        let reply = orch
            .reply("web:u1", "I feel so sad and lonely today")
            .await
            .unwrap();
        assert_eq!(reply.mood, Mood::Sad);

        let reply = orch
            .reply("web:u1", "I love this, it's great!")
            .await
            .unwrap();
        assert_eq!(reply.mood, Mood::Happy);
    }

    #[tokio::test]
    async fn test_concurrent_replies_same_session_serialize() {
        let model = Arc::new(MockChatModel::new());
        let orch = Arc::new(orchestrator_with(StoreConfig::new(100, 50), model));

        let mut handles = Vec::new();
        for i in 0..8 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                orch.reply("web:u1", &format!("m{}", i)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = orch.store().history("web:u1").await.unwrap();
        // 8 committed exchanges, each user turn immediately followed by its
        // assistant turn.
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
    }
}
