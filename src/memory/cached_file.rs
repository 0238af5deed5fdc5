use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::observability::MEMORY_FLUSHES;
use crate::types::Message;

/// Where durable history lives when no path is configured.
pub const DEFAULT_MEMORY_PATH: &str = "chat_logs/chat_memory.json";

/// Unbounded history cached in memory and mirrored to one JSON file.
///
/// Reads are served from the cache.  `flush` rewrites the whole file; with write-through
/// enabled every `add` flushes as well.  The cache sits behind a reader/writer lock, so any
/// number of readers may proceed together while a writer (including `flush`) runs alone.
///
/// Opening never fails.  An unreadable or corrupt file is logged, remembered in
/// [`load_error`](Self::load_error), and treated as an empty history.
#[derive(Debug)]
pub struct CachedFileMemory {
    path: PathBuf,
    messages: RwLock<Vec<Message>>,
    write_through: bool,
    load_error: Option<Error>,
}

impl CachedFileMemory {
    /// Opens the history at `path`, seeding the cache from the file if one exists.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (messages, load_error) = match load(&path) {
            Ok(messages) => (messages, None),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "starting with empty chat memory");
                (Vec::new(), Some(err))
            }
        };
        Self {
            path,
            messages: RwLock::new(messages),
            write_through: false,
            load_error,
        }
    }

    /// Opens the history at [`DEFAULT_MEMORY_PATH`].
    pub fn open_default() -> Self {
        Self::open(DEFAULT_MEMORY_PATH)
    }

    /// Flush after every `add`.
    pub fn with_write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if every `add` flushes.
    pub fn write_through(&self) -> bool {
        self.write_through
    }

    /// The failure seen while loading, if any.
    pub fn load_error(&self) -> Option<&Error> {
        self.load_error.as_ref()
    }

    /// Appends a message, flushing if write-through is enabled.
    pub fn add(&self, message: Message) -> Result<()> {
        let mut messages = self.write();
        messages.push(message);
        if self.write_through {
            self.persist(&messages)?;
        }
        Ok(())
    }

    /// Appends a message and flushes, regardless of the write-through setting.
    pub fn add_and_save(&self, message: Message) -> Result<()> {
        let mut messages = self.write();
        messages.push(message);
        self.persist(&messages)
    }

    /// Snapshot of the history, oldest first.
    pub fn list(&self) -> Vec<Message> {
        self.read().clone()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when the history is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Empties the cache and the backing file.
    pub fn clear(&self) -> Result<()> {
        let mut messages = self.write();
        messages.clear();
        self.persist(&messages)
    }

    /// Writes the full history to the backing file.
    pub fn flush(&self) -> Result<()> {
        let messages = self.write();
        self.persist(&messages)
    }

    pub(crate) fn restore(&self, snapshot: Vec<Message>) -> Result<()> {
        let mut messages = self.write();
        *messages = snapshot;
        if self.write_through {
            self.persist(&messages)?;
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Message>> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Message>> {
        self.messages.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the write guard, so concurrent flushes never interleave.
    fn persist(&self, messages: &[Message]) -> Result<()> {
        let persistence = |what: &str, err: io::Error| {
            Error::persistence(
                format!("failed to {what} {}: {err}", self.path.display()),
                Some(Box::new(err)),
            )
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence("create directory for", e))?;
        }
        let json = serde_json::to_string_pretty(messages).map_err(|e| {
            Error::persistence(
                format!("failed to serialize chat memory: {e}"),
                Some(Box::new(e)),
            )
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| persistence("write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| persistence("replace", e))?;
        MEMORY_FLUSHES.click();
        tracing::debug!(path = %self.path.display(), messages = messages.len(), "flushed chat memory");
        Ok(())
    }
}

fn load(path: &Path) -> Result<Vec<Message>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(Error::persistence(
                format!("failed to read {}: {err}", path.display()),
                Some(Box::new(err)),
            ));
        }
    };
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&contents).map_err(|err| {
        Error::persistence(
            format!("failed to parse {}: {err}", path.display()),
            Some(Box::new(err)),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::Role;

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let memory = CachedFileMemory::open(&path);
        assert!(memory.load_error().is_none());
        memory.add(Message::system("sys")).unwrap();
        memory.add(Message::user("Hello")).unwrap();
        memory.add(Message::assistant("Hi").with_token_count(3)).unwrap();
        assert!(!path.exists());
        memory.flush().unwrap();

        let reopened = CachedFileMemory::open(&path);
        assert_eq!(reopened.list(), memory.list());
        assert_eq!(reopened.list()[2].token_count, Some(3));
    }

    #[test]
    fn file_is_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/memory.json");
        let memory = CachedFileMemory::open(&path);
        memory.add_and_save(Message::user("Hello")).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["role"], "user");
    }

    #[test]
    fn write_through_persists_each_add() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let memory = CachedFileMemory::open(&path).with_write_through(true);
        memory.add(Message::user("one")).unwrap();
        memory.add(Message::user("two")).unwrap();
        assert_eq!(CachedFileMemory::open(&path).len(), 2);
    }

    #[test]
    fn clear_empties_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let memory = CachedFileMemory::open(&path);
        memory.add_and_save(Message::user("one")).unwrap();
        memory.clear().unwrap();
        assert!(memory.is_empty());
        assert!(CachedFileMemory::open(&path).is_empty());
    }

    #[test]
    fn missing_and_empty_files_are_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let missing = CachedFileMemory::open(dir.path().join("missing.json"));
        assert!(missing.is_empty());
        assert!(missing.load_error().is_none());

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        let memory = CachedFileMemory::open(&empty);
        assert!(memory.is_empty());
        assert!(memory.load_error().is_none());
    }

    #[test]
    fn corrupt_file_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        fs::write(&path, "[{\"role\": \"user\", ").unwrap();
        let memory = CachedFileMemory::open(&path);
        assert!(memory.is_empty());
        assert!(memory.load_error().unwrap().is_persistence());
        memory.add(Message::user("fresh")).unwrap();
        memory.flush().unwrap();
        assert_eq!(CachedFileMemory::open(&path).len(), 1);
    }

    #[test]
    fn flush_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let memory = CachedFileMemory::open(blocker.join("memory.json"));
        memory.add(Message::user("x")).unwrap();
        assert!(memory.flush().unwrap_err().is_persistence());
        assert!(
            memory
                .add_and_save(Message::user("y"))
                .unwrap_err()
                .is_persistence()
        );
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(CachedFileMemory::open(dir.path().join("memory.json")));
        std::thread::scope(|scope| {
            for writer in 0..4 {
                let memory = Arc::clone(&memory);
                scope.spawn(move || {
                    for i in 0..25 {
                        memory.add(Message::user(format!("{writer}:{i}"))).unwrap();
                    }
                    memory.flush().unwrap();
                });
            }
            for _ in 0..4 {
                let memory = Arc::clone(&memory);
                scope.spawn(move || {
                    for _ in 0..50 {
                        let snapshot = memory.list();
                        assert!(snapshot.iter().all(|m| m.role == Role::User));
                    }
                });
            }
        });
        assert_eq!(memory.len(), 100);
        memory.flush().unwrap();
        assert_eq!(CachedFileMemory::open(memory.path()).len(), 100);
    }
}
