//! Persistence adapter: durable snapshots of the conversation store.
//!
//! The default implementation is a single human-readable JSON document
//! rewritten wholesale on each flush. It sits behind [`SnapshotStore`] so a
//! future embedded key-value store can replace it without touching the
//! store logic.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use luna_core::error::{LunaError, Result};
use luna_core::types::StoreSnapshot;

/// Durable snapshot storage for the conversation store.
pub trait SnapshotStore: Send + Sync {
    /// Write the full snapshot. Must be atomic with respect to partial
    /// writes: a crash mid-write never corrupts the previous on-disk state.
    fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;

    /// Read the last snapshot. A missing or unreadable/corrupt snapshot
    /// degrades to an empty store (logged), never an error.
    fn load(&self) -> StoreSnapshot;
}

/// JSON-file snapshot store using write-to-temp-then-rename.
#[derive(Debug, Clone)]
pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonSnapshotFile {
    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LunaError::Persistence(format!("create dir failed: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| LunaError::Persistence(format!("serialize failed: {}", e)))?;

        // Temp-then-rename keeps the previous snapshot intact if we crash
        // mid-write.
        let temp = self.temp_path();
        std::fs::write(&temp, content)
            .map_err(|e| LunaError::Persistence(format!("write failed: {}", e)))?;
        std::fs::rename(&temp, &self.path)
            .map_err(|e| LunaError::Persistence(format!("rename failed: {}", e)))?;

        debug!(path = %self.path.display(), sessions = snapshot.sessions.len(), "Snapshot saved");
        Ok(())
    }

    fn load(&self) -> StoreSnapshot {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file — starting empty");
                return StoreSnapshot::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Snapshot unreadable — starting empty");
                return StoreSnapshot::new();
            }
        };

        match serde_json::from_str::<StoreSnapshot>(&content) {
            Ok(snapshot) => {
                debug!(
                    path = %self.path.display(),
                    sessions = snapshot.sessions.len(),
                    "Snapshot loaded"
                );
                snapshot
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Snapshot corrupt — starting empty");
                StoreSnapshot::new()
            }
        }
    }
}
