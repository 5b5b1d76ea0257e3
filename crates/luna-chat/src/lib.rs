//! Reply orchestration for Luna.
//!
//! Turns one piece of user input into one assistant reply using a bounded
//! context window, commits both turns atomically, and keeps history bounded
//! via the store's summarization.

pub mod error;
pub mod orchestrator;
pub mod sentiment;

pub use error::ChatError;
pub use orchestrator::{ChatReply, OrchestratorConfig, ReplyOrchestrator};
pub use sentiment::{score, Mood};
