//! Shared domain types: turns, sessions, surfaces, and snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot format version, bumped on incompatible layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Prefix carried by the system turn that replaces summarized history.
///
/// Downstream consumers use it to distinguish condensed history from
/// ordinary content.
pub const RECAP_PREFIX: &str = "[recap]";

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// One role-tagged message within a session.
///
/// Turns are immutable after creation. They are never deleted individually,
/// only collectively folded into a recap turn by summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// True if this is the system turn holding condensed history.
    pub fn is_recap(&self) -> bool {
        self.role == Role::System && self.content.starts_with(RECAP_PREFIX)
    }
}

/// A durable conversational identity and its turn history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque id, unique per originating surface (see [`Surface`]).
    pub id: String,
    /// Ordered turns, insertion order = conversational order.
    pub turns: Vec<Turn>,
    /// Condensed text replacing elided history, if any.
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Originating surface for a session id.
///
/// Web and bot namespaces must not collide, so each surface maps a raw
/// identifier into its own prefixed namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Web,
    Bot,
    Anonymous,
}

impl Surface {
    /// Build the store-level session id for a raw surface identifier.
    pub fn session_id(&self, raw: &str) -> String {
        match self {
            Surface::Web => format!("web:{}", raw),
            Surface::Bot => format!("bot:{}", raw),
            Surface::Anonymous => format!("anon:{}", raw),
        }
    }
}

/// Serializable whole-store snapshot.
///
/// Sessions are keyed in a `BTreeMap` so the persisted JSON is
/// deterministic across flushes of the same state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u32,
    #[serde(default)]
    pub sessions: BTreeMap<String, Session>,
}

fn default_snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

impl StoreSnapshot {
    pub fn new() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            sessions: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Compact session listing for API surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub turn_count: usize,
    pub has_summary: bool,
    pub updated_at: DateTime<Utc>,
}
