//! Conversation store for Luna.
//!
//! Owns all per-identity session state, serializes mutation per session id,
//! bounds history growth via summarization, and snapshots the whole store
//! to a pluggable persistence adapter.

pub mod persist;
pub mod store;

pub use persist::{JsonSnapshotFile, SnapshotStore};
pub use store::{ConversationStore, StoreConfig};
