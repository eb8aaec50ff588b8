use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::Conversation;
use crate::config::MemoryConfig;

/// File-backed memory for one conversation.
///
/// The whole history is read and written as a single JSON array of
/// `{role, parts}` records. Clones share one lock, so `load`, `save` and
/// `clear` never interleave for the same file.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    path: PathBuf,
    enabled: bool,
    max_depth: usize,
    lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(path: impl Into<PathBuf>, max_depth: usize, enabled: bool) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                enabled,
                max_depth: max_depth.max(1),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(&config.file_path, config.max_history_depth, config.enabled)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn max_depth(&self) -> usize {
        self.inner.max_depth
    }

    /// Returns the persisted history, or an empty one when memory is disabled,
    /// missing, or unreadable.
    pub fn load(&self) -> Conversation {
        if !self.inner.enabled {
            return Conversation::new();
        }
        let Ok(_guard) = self.inner.lock.lock() else {
            warn!(path = %self.inner.path.display(), "conversation store lock poisoned; starting empty");
            return Conversation::new();
        };
        let raw = match std::fs::read_to_string(&self.inner.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Conversation::new(),
            Err(err) => {
                warn!(path = %self.inner.path.display(), error = %err, "memory load failed");
                return Conversation::new();
            }
        };
        if raw.trim().is_empty() {
            return Conversation::new();
        }
        match serde_json::from_str::<Conversation>(&raw) {
            Ok(conversation) => {
                debug!(turns = conversation.len(), "memory loaded");
                conversation
            }
            Err(err) => {
                warn!(path = %self.inner.path.display(), error = %err, "memory file is not a valid history");
                Conversation::new()
            }
        }
    }

    /// Persists the most recent `max_depth` turns. Disabled stores do nothing.
    pub fn save(&self, conversation: &Conversation) -> anyhow::Result<()> {
        if !self.inner.enabled {
            return Ok(());
        }
        let trimmed = conversation.trimmed(self.inner.max_depth);
        let payload = serde_json::to_string_pretty(&trimmed)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("conversation store lock poisoned"))?;
        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.inner.path, payload)?;
        debug!(turns = trimmed.len(), path = %self.inner.path.display(), "memory saved");
        Ok(())
    }

    /// Removes the persisted history. A missing file is not an error.
    pub fn clear(&self) -> anyhow::Result<()> {
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("conversation store lock poisoned"))?;
        match std::fs::remove_file(&self.inner.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::conversation::{Conversation, Turn};

    use super::ConversationStore;

    fn history(count: usize) -> Conversation {
        Conversation::from_turns(
            (0..count)
                .map(|idx| Turn::user(format!("msg-{idx}")))
                .collect(),
        )
    }

    #[test]
    fn load_returns_empty_when_file_missing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ConversationStore::new(temp.path().join("memory.json"), 10, true);
        assert!(store.load().is_empty());
        Ok(())
    }

    #[test]
    fn save_trims_to_most_recent_turns() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ConversationStore::new(temp.path().join("memory.json"), 10, true);
        store.save(&history(12))?;

        let loaded = store.load();
        assert_eq!(loaded.len(), 10);
        assert_eq!(loaded.turns()[0].text(), "msg-2");
        assert_eq!(loaded.turns()[9].text(), "msg-11");
        Ok(())
    }

    #[test]
    fn save_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("memory.json");
        let store = ConversationStore::new(&path, 4, true);
        store.save(&history(6))?;
        let first = std::fs::read_to_string(&path)?;
        store.save(&history(6))?;
        let second = std::fs::read_to_string(&path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn disabled_store_neither_reads_nor_writes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("memory.json");
        let enabled = ConversationStore::new(&path, 10, true);
        enabled.save(&history(2))?;

        let disabled = ConversationStore::new(&path, 10, false);
        assert!(disabled.load().is_empty());
        disabled.save(&history(5))?;
        assert_eq!(enabled.load().len(), 2);
        Ok(())
    }

    #[test]
    fn corrupt_file_loads_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("memory.json");
        std::fs::write(&path, "{not json")?;
        let store = ConversationStore::new(&path, 10, true);
        assert!(store.load().is_empty());

        std::fs::write(&path, r#"[{"role": "narrator", "parts": ["x"]}]"#)?;
        assert!(store.load().is_empty());
        Ok(())
    }

    #[test]
    fn clear_twice_is_not_an_error_and_empties_memory() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ConversationStore::new(temp.path().join("memory.json"), 10, true);
        store.save(&history(3))?;
        store.clear()?;
        store.clear()?;
        assert!(store.load().is_empty());
        Ok(())
    }

    #[test]
    fn save_reports_write_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // A directory at the target path makes the write fail.
        let path = temp.path().join("memory.json");
        std::fs::create_dir_all(&path)?;
        let store = ConversationStore::new(&path, 10, true);
        assert!(store.save(&history(1)).is_err());
        Ok(())
    }
}
