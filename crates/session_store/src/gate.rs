use tracing::{debug, warn};

use crate::error::SessionStoreError;
use crate::schema::{decode_snapshot, encode_snapshot, Snapshot};
use crate::slot::KeyValueSlot;

pub const DEFAULT_STORAGE_KEY: &str = "chat-messages";

/// Result of a best-effort write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    Dropped,
}

/// Loads and saves whole snapshots through a single slot key.
pub struct PersistenceGate {
    slot: Box<dyn KeyValueSlot>,
    key: String,
}

impl PersistenceGate {
    #[must_use]
    pub fn new(slot: impl KeyValueSlot + 'static, key: impl Into<String>) -> Self {
        Self {
            slot: Box::new(slot),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn with_default_key(slot: impl KeyValueSlot + 'static) -> Self {
        Self::new(slot, DEFAULT_STORAGE_KEY)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the slot, substituting the empty snapshot for anything unusable.
    #[must_use]
    pub fn load(&self) -> Snapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(key = %self.key, "no stored snapshot; starting empty");
                Snapshot::empty()
            }
            Err(error) => {
                warn!(key = %self.key, %error, "discarding unreadable stored snapshot");
                Snapshot::empty()
            }
        }
    }

    /// Like [`PersistenceGate::load`] but surfaces whole-value failures.
    pub fn try_load(&self) -> Result<Option<Snapshot>, SessionStoreError> {
        let Some(raw) = self.slot.read(&self.key)? else {
            return Ok(None);
        };

        let (snapshot, report) = decode_snapshot(&self.key, &raw)?;
        if !report.is_clean() {
            warn!(
                key = %self.key,
                defaulted = ?report.defaulted_fields,
                dropped_messages = report.dropped_messages,
                dropped_durations = report.dropped_durations,
                "stored snapshot partially recovered"
            );
        }

        Ok(Some(snapshot))
    }

    /// Writes the snapshot; failures are logged and reported, never raised.
    pub fn save(&mut self, snapshot: &Snapshot) -> SaveOutcome {
        match self.try_save(snapshot) {
            Ok(()) => SaveOutcome::Written,
            Err(error) => {
                warn!(key = %self.key, %error, "dropping snapshot write");
                SaveOutcome::Dropped
            }
        }
    }

    pub fn try_save(&mut self, snapshot: &Snapshot) -> Result<(), SessionStoreError> {
        let encoded = encode_snapshot(&self.key, snapshot)?;
        self.slot.write(&self.key, &encoded)
    }
}

impl std::fmt::Debug for PersistenceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGate")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
