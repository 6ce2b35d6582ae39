use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::SessionStoreError;
use crate::paths::slot_file_name;

/// A durable string store addressed by key.
pub trait KeyValueSlot: Send {
    /// Returns `Ok(None)` when nothing has been written under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, SessionStoreError>;

    fn write(&mut self, key: &str, value: &str) -> Result<(), SessionStoreError>;
}

/// Stores each key as `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileSlot {
    root: PathBuf,
}

impl FileSlot {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(slot_file_name(key))
    }
}

impl KeyValueSlot for FileSlot {
    fn read(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SessionStoreError::io("reading slot file", path, source)),
        }
    }

    // Readers must never see a torn value, so write beside the target and rename.
    fn write(&mut self, key: &str, value: &str) -> Result<(), SessionStoreError> {
        fs::create_dir_all(&self.root)
            .map_err(|source| SessionStoreError::io("creating slot directory", &self.root, source))?;

        let path = self.path_for(key);
        let tmp_path = self.root.join(format!(".{}.tmp", slot_file_name(key)));
        {
            let mut file = fs::File::create(&tmp_path).map_err(|source| {
                SessionStoreError::io("creating temporary slot file", &tmp_path, source)
            })?;
            file.write_all(value.as_bytes()).map_err(|source| {
                SessionStoreError::io("writing temporary slot file", &tmp_path, source)
            })?;
            file.sync_all().map_err(|source| {
                SessionStoreError::io("syncing temporary slot file", &tmp_path, source)
            })?;
        }

        fs::rename(&tmp_path, &path)
            .map_err(|source| SessionStoreError::io("replacing slot file", &path, source))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, String>,
    quota: Option<usize>,
    writes: usize,
}

/// In-process slot. Clones share storage, so a clone outlives a "reload".
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects writes whose value is longer than `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        let slot = Self::default();
        lock_unpoisoned(&slot.state).quota = Some(quota);
        slot
    }

    pub fn set_quota(&self, quota: Option<usize>) {
        lock_unpoisoned(&self.state).quota = quota;
    }

    /// Seeds a raw value without going through quota checks.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        lock_unpoisoned(&self.state)
            .values
            .insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        lock_unpoisoned(&self.state).values.get(key).cloned()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        lock_unpoisoned(&self.state).writes
    }
}

impl KeyValueSlot for MemorySlot {
    fn read(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        Ok(self.get_raw(key))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), SessionStoreError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(quota) = state.quota {
            if value.len() > quota {
                return Err(SessionStoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed: value.len(),
                    quota,
                });
            }
        }

        state.values.insert(key.to_string(), value.to_string());
        state.writes += 1;
        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_slot_clones_share_values() {
        let slot = MemorySlot::new();
        let mut writer = slot.clone();

        writer.write("k", "v").expect("write succeeds");

        assert_eq!(slot.read("k").expect("read succeeds"), Some("v".to_string()));
        assert_eq!(slot.write_count(), 1);
    }

    #[test]
    fn memory_slot_quota_rejects_oversized_values_and_keeps_previous() {
        let mut slot = MemorySlot::with_quota(4);
        slot.write("k", "tiny").expect("fits quota");

        let error = slot.write("k", "too large").expect_err("exceeds quota");

        assert!(matches!(
            error,
            SessionStoreError::QuotaExceeded {
                needed: 9,
                quota: 4,
                ..
            }
        ));
        assert_eq!(slot.get_raw("k").as_deref(), Some("tiny"));
    }

    #[test]
    fn file_slot_reads_none_before_first_write() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let slot = FileSlot::new(dir.path().join("nested"));

        assert_eq!(slot.read("chat-messages").expect("read succeeds"), None);
    }

    #[test]
    fn file_slot_write_replaces_value_without_leaving_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut slot = FileSlot::new(dir.path());

        slot.write("chat-messages", "first").expect("first write");
        slot.write("chat-messages", "second").expect("second write");

        assert_eq!(
            slot.read("chat-messages").expect("read succeeds").as_deref(),
            Some("second")
        );
        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("dir lists")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("chat-messages.json")]);
    }
}
